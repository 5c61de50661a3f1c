//! Reconciliation loop.
//!
//! One cycle lists nodes, provisions probe workloads, waits for them, runs
//! the pairwise test and reports the matrix. Cleanup runs after every cycle
//! on every exit path. In continuous mode the loop reconnects to the cluster
//! at the top of each iteration, then sleeps for the configured interval.
//!
//! # Graceful Shutdown
//!
//! Cancelling the token never interrupts a running cycle; the loop exits at
//! the next sleep.

use crate::cluster::{ClusterConnector, ClusterControlPlane};
use crate::config::{Config, ReportFormat};
use crate::errors::NetcheckError;
use crate::models::plan_workloads;
use crate::observability::{HealthState, MetricsSink};
use crate::services::{PairwiseTester, Provisioner, ReachabilityMatrix, ReadinessPoller};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Status label for cycles that completed.
pub const CYCLE_SUCCESS: &str = "success";

/// Run one full cycle against `cluster`, then clean up.
///
/// A cleanup failure is logged but never replaces the cycle's own result.
///
/// # Errors
///
/// Any error of the provision, readiness or test stages.
pub async fn run_cycle(
    cluster: &dyn ClusterControlPlane,
    config: &Config,
    sink: &dyn MetricsSink,
) -> Result<ReachabilityMatrix, NetcheckError> {
    let result = check(cluster, config, sink).await;

    match Provisioner::new(cluster, &config.namespace).cleanup().await {
        Ok(summary) => info!(
            target: "netcheck.task.reconcile",
            pods = summary.pods_deleted,
            services = summary.services_deleted,
            "Cleanup complete"
        ),
        Err(e) => tracing::error!(
            target: "netcheck.task.reconcile",
            error = %e,
            "Cleanup failed, probe resources may be left behind"
        ),
    }

    result
}

async fn check(
    cluster: &dyn ClusterControlPlane,
    config: &Config,
    sink: &dyn MetricsSink,
) -> Result<ReachabilityMatrix, NetcheckError> {
    let mut nodes = cluster.list_nodes().await?;
    nodes.sort();
    nodes.dedup();
    info!(target: "netcheck.task.reconcile", nodes = nodes.len(), "Listed cluster nodes");

    let workloads = plan_workloads(&nodes, &config.image);
    let provisioned = Provisioner::new(cluster, &config.namespace)
        .provision(&workloads)
        .await?;
    info!(
        target: "netcheck.task.reconcile",
        created = provisioned.created,
        adopted = provisioned.adopted,
        "Probe workloads provisioned"
    );

    let readiness = ReadinessPoller::new(cluster, &config.namespace, config.readiness)
        .wait_for_ready(&workloads)
        .await?;

    let results = PairwiseTester::new(cluster, &config.namespace, config.probe)
        .run(&readiness.ready)
        .await?;

    let tested = readiness.ready.iter().map(|r| r.node().to_string());
    let matrix = ReachabilityMatrix::new(nodes, tested, results);

    let rendered = match config.report_format {
        ReportFormat::Table => matrix.render_table(),
        ReportFormat::Json => matrix.render_json()?,
    };
    let counters = matrix.counters();
    info!(
        target: "netcheck.report",
        total_nodes = counters.total_nodes,
        tested_nodes = counters.tested_nodes,
        issues = counters.issues,
        "Test complete:\n{rendered}"
    );
    sink.publish(&counters);

    Ok(matrix)
}

/// Connect, run a cycle and record its outcome.
async fn connect_and_run(
    connector: &dyn ClusterConnector,
    config: &Config,
    sink: &dyn MetricsSink,
) -> Result<ReachabilityMatrix, NetcheckError> {
    let cycle_id = Uuid::new_v4();
    let started = Instant::now();

    let result = async {
        let cluster = connector.connect().await?;
        run_cycle(cluster.as_ref(), config, sink).await
    }
    .instrument(info_span!("netcheck.cycle", cycle_id = %cycle_id))
    .await;

    let status = match &result {
        Ok(_) => CYCLE_SUCCESS,
        Err(e) => e.kind(),
    };
    sink.record_cycle(status, started.elapsed());
    result
}

/// Run a single cycle.
///
/// # Errors
///
/// The cycle's error, including failure to acquire credentials.
#[instrument(skip_all, name = "netcheck.task.once")]
pub async fn run_once(
    connector: &dyn ClusterConnector,
    config: &Config,
    sink: &dyn MetricsSink,
) -> Result<ReachabilityMatrix, NetcheckError> {
    connect_and_run(connector, config, sink).await
}

/// Run cycles until `cancel_token` is cancelled.
///
/// Cycle errors are logged and retried after the normal interval.
#[instrument(skip_all, name = "netcheck.task.reconcile")]
pub async fn run_reconcile_loop(
    connector: Arc<dyn ClusterConnector>,
    config: Config,
    sink: Arc<dyn MetricsSink>,
    health: Arc<HealthState>,
    cancel_token: CancellationToken,
) {
    info!(
        target: "netcheck.task.reconcile",
        namespace = %config.namespace,
        interval_secs = config.interval.as_secs(),
        "Starting reconcile loop"
    );

    loop {
        match connect_and_run(connector.as_ref(), &config, sink.as_ref()).await {
            Ok(matrix) => info!(
                target: "netcheck.task.reconcile",
                issues = matrix.counters().issues,
                "Cycle finished"
            ),
            Err(e) => warn!(
                target: "netcheck.task.reconcile",
                error = %e,
                kind = e.kind(),
                "Cycle failed, retrying after interval"
            ),
        }
        health.cycle_finished();

        if sleep_or_cancel(config.interval, &cancel_token).await {
            info!(
                target: "netcheck.task.reconcile",
                "Reconcile loop received shutdown signal, exiting"
            );
            break;
        }
    }

    health.set_not_ready();
    info!(target: "netcheck.task.reconcile", "Reconcile loop stopped");
}

/// Returns true if cancelled before the interval elapsed.
async fn sleep_or_cancel(interval: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => false,
        () = cancel_token.cancelled() => true,
    }
}
