//! Provisioning and readiness tests below the full cycle.
//!
//! These call the provisioner and readiness poller directly so the exit
//! buckets and creation summaries are visible; `run_cycle` only keeps the
//! ready set.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use netcheck::config::ReadinessBudget;
use netcheck::errors::NetcheckError;
use netcheck::models::{plan_workloads, ProbeWorkload};
use netcheck::services::{ProvisionSummary, Provisioner, ReadinessOutcome, ReadinessPoller};
use netcheck_test_utils::{workload_name, MockCluster, ScriptedPhase};
use std::time::Duration;

const NAMESPACE: &str = "netcheck-test";

fn workloads_for(nodes: &[&str]) -> Vec<ProbeWorkload> {
    let nodes: Vec<String> = nodes.iter().map(ToString::to_string).collect();
    plan_workloads(&nodes, "nginx")
}

async fn provision_and_wait(
    cluster: &MockCluster,
    nodes: &[&str],
) -> Result<ReadinessOutcome, NetcheckError> {
    let workloads = workloads_for(nodes);
    Provisioner::new(cluster, NAMESPACE)
        .provision(&workloads)
        .await?;
    ReadinessPoller::new(cluster, NAMESPACE, ReadinessBudget::default())
        .wait_for_ready(&workloads)
        .await
}

fn ready_nodes(outcome: &ReadinessOutcome) -> Vec<&str> {
    outcome.ready.iter().map(|r| r.node()).collect()
}

// ============================================================================
// Readiness buckets
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unscheduled_node_lands_in_never_scheduled() -> Result<()> {
    let cluster = MockCluster::with_nodes(&["a", "b", "c"]).with_unscheduled_node("c");
    let started = tokio::time::Instant::now();

    let outcome = provision_and_wait(&cluster, &["a", "b", "c"]).await?;

    assert_eq!(ready_nodes(&outcome), vec!["a", "b"]);
    assert_eq!(outcome.never_scheduled, vec!["c".to_string()]);
    assert!(outcome.still_starting.is_empty());
    assert!(outcome.failed.is_empty());
    // Polling stops once the 15s scheduling budget is spent
    assert_eq!(outcome.ticks, 3);
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(20));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stuck_starting_node_lands_in_still_starting() -> Result<()> {
    let cluster = MockCluster::with_nodes(&["a", "b", "c"])
        .with_phase_script("c", vec![ScriptedPhase::STARTING]);

    let outcome = provision_and_wait(&cluster, &["a", "b", "c"]).await?;

    assert_eq!(ready_nodes(&outcome), vec!["a", "b"]);
    assert_eq!(outcome.still_starting, vec!["c".to_string()]);
    assert!(outcome.never_scheduled.is_empty());
    assert!(outcome.failed.is_empty());
    // 5s ticks until the 120s total budget is spent
    assert_eq!(outcome.ticks, 24);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_scheduled_node_is_not_never_scheduled() -> Result<()> {
    let cluster = MockCluster::with_nodes(&["a", "b"]).with_phase_script(
        "b",
        vec![
            ScriptedPhase::UNSCHEDULED,
            ScriptedPhase::UNSCHEDULED,
            ScriptedPhase::STARTING,
            ScriptedPhase::RUNNING,
        ],
    );

    let outcome = provision_and_wait(&cluster, &["a", "b"]).await?;

    assert_eq!(ready_nodes(&outcome), vec!["a", "b"]);
    assert!(outcome.never_scheduled.is_empty());
    assert!(outcome.still_starting.is_empty());
    assert_eq!(outcome.ticks, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_node_lands_in_failed() -> Result<()> {
    let cluster = MockCluster::with_nodes(&["a", "b", "c"])
        .with_phase_script("b", vec![ScriptedPhase::FAILED]);

    let outcome = provision_and_wait(&cluster, &["a", "b", "c"]).await?;

    assert_eq!(ready_nodes(&outcome), vec!["a", "c"]);
    assert_eq!(outcome.failed, vec!["b".to_string()]);
    assert!(outcome.never_scheduled.is_empty());
    assert!(outcome.still_starting.is_empty());
    assert_eq!(outcome.ticks, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_every_bucket_at_once() -> Result<()> {
    let cluster = MockCluster::with_nodes(&["a", "b", "c", "d"])
        .with_unscheduled_node("b")
        .with_phase_script("c", vec![ScriptedPhase::STARTING])
        .with_phase_script("d", vec![ScriptedPhase::FAILED]);

    let outcome = provision_and_wait(&cluster, &["a", "b", "c", "d"]).await?;

    assert_eq!(ready_nodes(&outcome), vec!["a"]);
    assert_eq!(outcome.never_scheduled, vec!["b".to_string()]);
    assert_eq!(outcome.still_starting, vec!["c".to_string()]);
    assert_eq!(outcome.failed, vec!["d".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_nothing_running_is_an_error() {
    let cluster = MockCluster::with_nodes(&["a"]).with_unscheduled_node("a");

    let err = provision_and_wait(&cluster, &["a"]).await.unwrap_err();

    assert!(matches!(err, NetcheckError::NoReadyWorkloads));
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_double_provision_adopts_everything() -> Result<()> {
    let nodes = ["a", "b", "c"];
    let cluster = MockCluster::with_nodes(&nodes);
    let workloads = workloads_for(&nodes);
    let provisioner = Provisioner::new(&cluster, NAMESPACE);

    let first = provisioner.provision(&workloads).await?;
    let second = provisioner.provision(&workloads).await?;

    // Counted per resource: one pod and one service per node
    assert_eq!(
        first,
        ProvisionSummary {
            created: 6,
            adopted: 0
        }
    );
    assert_eq!(
        second,
        ProvisionSummary {
            created: 0,
            adopted: 6
        }
    );

    let expected: Vec<String> = nodes.iter().map(|n| workload_name(n)).collect();
    assert_eq!(cluster.pod_names(), expected);
    assert_eq!(cluster.service_names(), expected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_provision_adopts_only_leftovers() -> Result<()> {
    let nodes = ["a", "b"];
    let cluster = MockCluster::with_nodes(&nodes).with_existing_workload("b");

    let summary = Provisioner::new(&cluster, NAMESPACE)
        .provision(&workloads_for(&nodes))
        .await?;

    assert_eq!(
        summary,
        ProvisionSummary {
            created: 2,
            adopted: 2
        }
    );
    assert_eq!(cluster.pod_names().len(), 2);
    assert_eq!(cluster.service_names().len(), 2);
    Ok(())
}
