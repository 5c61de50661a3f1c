//! netcheck error types.
//!
//! Cycle errors abort the current cycle but never skip cleanup. In
//! continuous mode the reconcile loop logs them and retries on the next
//! interval; in single-shot mode they become a non-zero exit.

use crate::cluster::ClusterError;
use thiserror::Error;

/// Error raised by a check cycle.
#[derive(Debug, Error)]
pub enum NetcheckError {
    /// Cluster API call failed outside of a more specific step.
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Probe resource creation failed with anything other than a conflict.
    #[error("Failed to provision {resource} {workload}: {source}")]
    Provisioning {
        resource: &'static str,
        workload: String,
        #[source]
        source: ClusterError,
    },

    /// No probe workload reached Running within the readiness budget.
    #[error("No probe workloads are ready")]
    NoReadyWorkloads,

    /// A pair test could not run its remote command.
    #[error("Pair test {from} -> {to} failed: {source}")]
    PairTest {
        from: String,
        to: String,
        #[source]
        source: ClusterError,
    },

    /// Cleanup left resources behind.
    #[error("Cleanup incomplete: {failed} resource(s) could not be removed")]
    Cleanup { failed: usize },

    /// Report rendering failed.
    #[error("Report error: {0}")]
    Report(String),
}

impl NetcheckError {
    /// Short, bounded label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            NetcheckError::Cluster(_) => "cluster",
            NetcheckError::Provisioning { .. } => "provisioning",
            NetcheckError::NoReadyWorkloads => "no_ready_workloads",
            NetcheckError::PairTest { .. } => "pair_test",
            NetcheckError::Cleanup { .. } => "cleanup",
            NetcheckError::Report(_) => "report",
        }
    }
}
