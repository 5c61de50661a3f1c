//! Tests for single-shot and continuous reconcile behavior.
//!
//! Uses tokio's paused clock so the cycle interval elapses instantly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use netcheck::errors::NetcheckError;
use netcheck::observability::HealthState;
use netcheck::tasks::{run_once, run_reconcile_loop};
use netcheck_test_utils::{loop_config, test_config, MockCluster, MockConnector, RecordingMetricsSink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Single-shot
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_once_success_records_cycle() {
    let cluster = MockCluster::with_nodes(&["a", "b"]);
    let connector = MockConnector::new(cluster.clone());
    let sink = RecordingMetricsSink::new();

    let matrix = run_once(&connector, &test_config(), &sink).await.unwrap();

    assert_eq!(matrix.counters().tested_nodes, 2);
    assert_eq!(connector.connects(), 1);
    assert_eq!(sink.cycle_statuses(), vec!["success"]);
    assert_eq!(cluster.cleanup_passes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_once_credential_failure() {
    let connector = MockConnector::failing();
    let sink = RecordingMetricsSink::new();

    let err = run_once(&connector, &test_config(), &sink).await.unwrap_err();

    assert!(matches!(err, NetcheckError::Cluster(_)));
    assert_eq!(sink.cycle_statuses(), vec!["cluster"]);
    assert!(sink.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_once_cycle_failure_is_reported() {
    let cluster = MockCluster::with_nodes(&["a", "b"]).with_exec_error("a");
    let connector = MockConnector::new(cluster.clone());
    let sink = RecordingMetricsSink::new();

    let err = run_once(&connector, &test_config(), &sink).await.unwrap_err();

    assert_eq!(err.kind(), "pair_test");
    assert_eq!(sink.cycle_statuses(), vec!["pair_test"]);
    assert_eq!(cluster.cleanup_passes(), 1);
}

// ============================================================================
// Continuous
// ============================================================================

struct LoopHarness {
    connector: MockConnector,
    sink: RecordingMetricsSink,
    health: Arc<HealthState>,
    cancel_token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

fn spawn_loop(connector: MockConnector) -> LoopHarness {
    let sink = RecordingMetricsSink::new();
    let health = Arc::new(HealthState::new());
    let cancel_token = CancellationToken::new();

    let handle = tokio::spawn(run_reconcile_loop(
        Arc::new(connector.clone()),
        loop_config(INTERVAL),
        Arc::new(sink.clone()),
        Arc::clone(&health),
        cancel_token.clone(),
    ));

    LoopHarness {
        connector,
        sink,
        health,
        cancel_token,
        handle,
    }
}

#[tokio::test(start_paused = true)]
async fn test_loop_reconnects_every_iteration() {
    let cluster = MockCluster::with_nodes(&["a", "b"]);
    let harness = spawn_loop(MockConnector::new(cluster.clone()));

    // Cycles start at 0s, 65s and 130s; each takes one 5s readiness tick
    tokio::time::sleep(Duration::from_secs(150)).await;

    assert_eq!(harness.connector.connects(), 3);
    assert_eq!(harness.health.cycles_finished(), 3);
    assert_eq!(cluster.cleanup_passes(), 3);
    assert_eq!(harness.sink.published().len(), 3);
    assert!(harness.health.is_ready());

    harness.cancel_token.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_not_ready_before_first_cycle() {
    let cluster = MockCluster::with_nodes(&["a", "b"]);
    let harness = spawn_loop(MockConnector::new(cluster));

    // First cycle is still waiting on its readiness tick
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!harness.health.is_ready());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.health.is_ready());

    harness.cancel_token.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_failing_cycles() {
    let harness = spawn_loop(MockConnector::failing());

    // Failing cycles take no time: 0s, 60s, 120s
    tokio::time::sleep(Duration::from_secs(150)).await;

    assert_eq!(harness.connector.connects(), 3);
    assert_eq!(harness.sink.cycle_statuses(), vec!["cluster"; 3]);
    // The checker itself is healthy even when the cluster is not
    assert!(harness.health.is_ready());

    harness.cancel_token.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_exits_on_cancel_during_sleep() {
    let cluster = MockCluster::with_nodes(&["a", "b"]);
    let harness = spawn_loop(MockConnector::new(cluster.clone()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    harness.cancel_token.cancel();

    tokio::time::timeout(Duration::from_secs(1), harness.handle)
        .await
        .expect("loop should exit promptly after cancel")
        .unwrap();

    assert_eq!(harness.connector.connects(), 1);
    assert_eq!(cluster.cleanup_passes(), 1);
    assert!(!harness.health.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_cycle_finishes_cycle_and_cleanup() {
    let cluster = MockCluster::with_nodes(&["a", "b"]);
    let harness = spawn_loop(MockConnector::new(cluster.clone()));

    // Cancel while the first cycle waits on its readiness tick
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.cancel_token.cancel();
    harness.handle.await.unwrap();

    assert_eq!(harness.sink.cycle_statuses(), vec!["success"]);
    assert_eq!(cluster.cleanup_passes(), 1);
    assert!(cluster.pod_names().is_empty());
}
