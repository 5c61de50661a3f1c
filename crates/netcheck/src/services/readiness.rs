//! Readiness polling for probe workloads.
//!
//! Every tick lists the probe pods and recomputes the full partition of
//! workloads into Scheduling / Starting / Running / Failed. Only the start
//! instant of the wait carries over between ticks. The budgets are checked
//! once per tick, so a slow listing can overrun them by up to one tick.

use crate::cluster::{ClusterControlPlane, PodPhase, WorkloadStatus};
use crate::config::ReadinessBudget;
use crate::errors::NetcheckError;
use crate::models::{label_selector, ProbeWorkload, ReadinessState};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{error, info, instrument};

/// A workload whose pod reached Running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyWorkload {
    pub workload: ProbeWorkload,
    /// Pod address for direct probes.
    pub pod_ip: Option<String>,
}

impl ReadyWorkload {
    #[must_use]
    pub fn node(&self) -> &str {
        &self.workload.node
    }
}

/// Classify one workload from its current pod status.
///
/// A pod missing from the listing has not been accepted yet and counts as
/// Scheduling.
#[must_use]
pub fn classify(status: Option<&WorkloadStatus>) -> ReadinessState {
    let Some(status) = status else {
        return ReadinessState::Scheduling;
    };

    match status.phase {
        PodPhase::Pending if status.start_time.is_none() => ReadinessState::Scheduling,
        PodPhase::Pending => ReadinessState::Starting,
        PodPhase::Running => ReadinessState::Running,
        PodPhase::Succeeded | PodPhase::Failed | PodPhase::Unknown => ReadinessState::Failed,
    }
}

/// Disjoint readiness buckets for one tick. Node lists keep workload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessPartition {
    pub scheduling: Vec<String>,
    pub starting: Vec<String>,
    pub running: Vec<ReadyWorkload>,
    pub failed: Vec<String>,
}

impl ReadinessPartition {
    /// Partition workloads by their pod statuses.
    #[must_use]
    pub fn compute(workloads: &[ProbeWorkload], statuses: &[WorkloadStatus]) -> Self {
        let by_name: HashMap<&str, &WorkloadStatus> =
            statuses.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut partition = Self::default();
        for workload in workloads {
            let status = by_name.get(workload.name.as_str()).copied();
            match classify(status) {
                ReadinessState::Scheduling => partition.scheduling.push(workload.node.clone()),
                ReadinessState::Starting => partition.starting.push(workload.node.clone()),
                ReadinessState::Running => partition.running.push(ReadyWorkload {
                    workload: workload.clone(),
                    pod_ip: status.and_then(|s| s.pod_ip.clone()),
                }),
                ReadinessState::Failed => partition.failed.push(workload.node.clone()),
            }
        }
        partition
    }

    /// Total workloads across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scheduling.len() + self.starting.len() + self.running.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Final readiness outcome once polling stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessOutcome {
    /// Test subjects.
    pub ready: Vec<ReadyWorkload>,
    /// Still unscheduled when the scheduling budget ran out.
    pub never_scheduled: Vec<String>,
    /// Still starting when the total budget ran out.
    pub still_starting: Vec<String>,
    pub failed: Vec<String>,
    /// Number of status listings performed.
    pub ticks: u32,
}

/// Polls probe pods until they settle or the budget runs out.
pub struct ReadinessPoller<'a> {
    cluster: &'a dyn ClusterControlPlane,
    namespace: &'a str,
    budget: ReadinessBudget,
}

impl<'a> ReadinessPoller<'a> {
    #[must_use]
    pub fn new(
        cluster: &'a dyn ClusterControlPlane,
        namespace: &'a str,
        budget: ReadinessBudget,
    ) -> Self {
        Self {
            cluster,
            namespace,
            budget,
        }
    }

    /// Wait for probe pods to become ready.
    ///
    /// Stops as soon as nothing is Starting and nothing is Scheduling within
    /// the scheduling budget, or when the total budget is exhausted.
    ///
    /// # Errors
    ///
    /// - `NetcheckError::Cluster` - the status listing failed
    /// - `NetcheckError::NoReadyWorkloads` - nothing reached Running
    #[instrument(skip_all, fields(namespace = %self.namespace, workloads = workloads.len()))]
    pub async fn wait_for_ready(
        &self,
        workloads: &[ProbeWorkload],
    ) -> Result<ReadinessOutcome, NetcheckError> {
        let selector = label_selector();
        let start = Instant::now();
        let mut ticks = 0u32;

        let partition = loop {
            tokio::time::sleep(self.budget.poll_interval).await;

            let statuses = self
                .cluster
                .list_workload_pods(self.namespace, &selector)
                .await?;
            ticks += 1;

            let partition = ReadinessPartition::compute(workloads, &statuses);
            let elapsed = start.elapsed();

            let awaiting_schedule =
                !partition.scheduling.is_empty() && elapsed < self.budget.schedule_timeout;
            if partition.starting.is_empty() && !awaiting_schedule {
                break partition;
            }
            if elapsed >= self.budget.ready_timeout {
                break partition;
            }

            info!(
                target: "netcheck.readiness",
                scheduling = partition.scheduling.len(),
                starting = partition.starting.len(),
                running = partition.running.len(),
                failed = partition.failed.len(),
                elapsed_secs = elapsed.as_secs(),
                "Waiting for probe pods to start"
            );
        };

        let outcome = ReadinessOutcome {
            ready: partition.running,
            never_scheduled: partition.scheduling,
            still_starting: partition.starting,
            failed: partition.failed,
            ticks,
        };

        if !outcome.failed.is_empty() {
            error!(
                target: "netcheck.readiness",
                nodes = %outcome.failed.join(", "),
                "Some probe pods have failed"
            );
        }
        if !outcome.never_scheduled.is_empty() {
            error!(
                target: "netcheck.readiness",
                nodes = %outcome.never_scheduled.join(", "),
                schedule_timeout_secs = self.budget.schedule_timeout.as_secs(),
                "Some probe pods were never scheduled"
            );
        }
        if !outcome.still_starting.is_empty() {
            error!(
                target: "netcheck.readiness",
                nodes = %outcome.still_starting.join(", "),
                ready_timeout_secs = self.budget.ready_timeout.as_secs(),
                "Some probe pods are still starting"
            );
        }
        if outcome.ready.is_empty() {
            error!(target: "netcheck.readiness", "No probe pods are ready");
            return Err(NetcheckError::NoReadyWorkloads);
        }

        info!(
            target: "netcheck.readiness",
            ready = outcome.ready.len(),
            ticks,
            "Probe pods started"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::plan_workloads;
    use chrono::Utc;

    fn status(name: &str, phase: PodPhase, started: bool) -> WorkloadStatus {
        WorkloadStatus {
            name: name.to_string(),
            phase,
            start_time: started.then(Utc::now),
            pod_ip: (phase == PodPhase::Running).then(|| "10.0.0.1".to_string()),
        }
    }

    #[test]
    fn test_classify_missing_pod_is_scheduling() {
        assert_eq!(classify(None), ReadinessState::Scheduling);
    }

    #[test]
    fn test_classify_pending_without_start_time_is_scheduling() {
        let s = status("netcheck-a", PodPhase::Pending, false);
        assert_eq!(classify(Some(&s)), ReadinessState::Scheduling);
    }

    #[test]
    fn test_classify_pending_with_start_time_is_starting() {
        let s = status("netcheck-a", PodPhase::Pending, true);
        assert_eq!(classify(Some(&s)), ReadinessState::Starting);
    }

    #[test]
    fn test_classify_running() {
        let s = status("netcheck-a", PodPhase::Running, true);
        assert_eq!(classify(Some(&s)), ReadinessState::Running);
    }

    #[test]
    fn test_classify_terminal_phases_are_failed() {
        for phase in [PodPhase::Succeeded, PodPhase::Failed, PodPhase::Unknown] {
            let s = status("netcheck-a", phase, true);
            assert_eq!(classify(Some(&s)), ReadinessState::Failed);
        }
    }

    #[test]
    fn test_partition_is_strict() {
        let nodes: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let workloads = plan_workloads(&nodes, "nginx");
        let statuses = vec![
            status("netcheck-a", PodPhase::Running, true),
            status("netcheck-b", PodPhase::Pending, true),
            status("netcheck-c", PodPhase::Failed, true),
            status("netcheck-d", PodPhase::Pending, false),
            // netcheck-e missing from the listing
            status("netcheck-stale", PodPhase::Running, true),
        ];

        let partition = ReadinessPartition::compute(&workloads, &statuses);

        assert_eq!(partition.len(), workloads.len());
        assert_eq!(partition.running.len(), 1);
        assert_eq!(partition.running.first().map(ReadyWorkload::node), Some("a"));
        assert_eq!(
            partition.running.first().and_then(|r| r.pod_ip.as_deref()),
            Some("10.0.0.1")
        );
        assert_eq!(partition.starting, vec!["b".to_string()]);
        assert_eq!(partition.failed, vec!["c".to_string()]);
        assert_eq!(partition.scheduling, vec!["d".to_string(), "e".to_string()]);
    }

    #[test]
    fn test_partition_of_nothing_is_empty() {
        let partition = ReadinessPartition::compute(&[], &[]);
        assert!(partition.is_empty());
    }
}
