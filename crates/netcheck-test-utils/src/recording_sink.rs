//! Metrics sink that records everything it is handed.

use netcheck::observability::MetricsSink;
use netcheck::services::CycleCounters;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// [`MetricsSink`] keeping every published value for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricsSink {
    published: Arc<Mutex<Vec<CycleCounters>>>,
    cycles: Arc<Mutex<Vec<(&'static str, Duration)>>>,
}

impl RecordingMetricsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters in publish order.
    pub fn published(&self) -> Vec<CycleCounters> {
        self.published.lock().unwrap().clone()
    }

    /// Last published counters, i.e. the current gauge values.
    pub fn last_published(&self) -> Option<CycleCounters> {
        self.published.lock().unwrap().last().copied()
    }

    /// Recorded cycle statuses in order.
    pub fn cycle_statuses(&self) -> Vec<&'static str> {
        self.cycles
            .lock()
            .unwrap()
            .iter()
            .map(|(status, _)| *status)
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn publish(&self, counters: &CycleCounters) {
        self.published.lock().unwrap().push(*counters);
    }

    fn record_cycle(&self, status: &'static str, duration: Duration) {
        self.cycles.lock().unwrap().push((status, duration));
    }
}
