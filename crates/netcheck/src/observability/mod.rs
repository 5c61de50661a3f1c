//! Observability for netcheck.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `netcheck_nodes_total` | Gauge | none | Nodes listed in the last cycle |
//! | `netcheck_nodes_tested` | Gauge | none | Nodes whose probe workload was tested |
//! | `netcheck_issues` | Gauge | none | Pairs with at least one failing probe |
//! | `netcheck_cycles_total` | Counter | `status` | Completed cycles by outcome |
//! | `netcheck_cycle_duration_seconds` | Histogram | `status` | Wall time of a cycle including cleanup |
//!
//! Gauges are overwritten once per successful cycle. The `/metrics`,
//! `/health` and `/ready` endpoints only exist in continuous mode.

pub mod health;
pub mod metrics;

pub use health::{health_router, metrics_router, HealthState};
pub use metrics::{init_metrics_recorder, MetricsSink, NoopMetricsSink, PrometheusMetricsSink};
