//! Metrics sink for per-cycle results.
//!
//! Counters flow out of the reporter as a [`CycleCounters`] value and are
//! handed to an injected [`MetricsSink`]; nothing here keeps state of its own.

use crate::services::report::CycleCounters;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // A cycle spans readiness wait (up to minutes) plus n^2 probes
        .set_buckets_for_metric(
            Matcher::Full("netcheck_cycle_duration_seconds".to_string()),
            &[
                5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0, 900.0, 1800.0,
            ],
        )
        .map_err(|e| format!("Failed to set cycle duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Destination for per-cycle results.
pub trait MetricsSink: Send + Sync {
    /// Overwrite the aggregate gauges with this cycle's counters.
    fn publish(&self, counters: &CycleCounters);

    /// Record a finished cycle (`status` is "success" or an error kind).
    fn record_cycle(&self, status: &'static str, duration: Duration);
}

/// Sink writing to the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsSink;

impl MetricsSink for PrometheusMetricsSink {
    // usize to f64 is exact for any realistic node or pair count
    #[allow(clippy::cast_precision_loss)]
    fn publish(&self, counters: &CycleCounters) {
        gauge!("netcheck_nodes_total").set(counters.total_nodes as f64);
        gauge!("netcheck_nodes_tested").set(counters.tested_nodes as f64);
        gauge!("netcheck_issues").set(counters.issues as f64);
    }

    fn record_cycle(&self, status: &'static str, duration: Duration) {
        counter!("netcheck_cycles_total", "status" => status).increment(1);
        histogram!("netcheck_cycle_duration_seconds", "status" => status)
            .record(duration.as_secs_f64());
    }
}

/// Sink for single-shot mode, where no metrics are exposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn publish(&self, _counters: &CycleCounters) {}

    fn record_cycle(&self, _status: &'static str, _duration: Duration) {}
}
