//! Cycle stages: provision, wait, test, report.

pub mod provisioner;
pub mod readiness;
pub mod report;
pub mod tester;

pub use provisioner::{CleanupSummary, ProvisionSummary, Provisioner};
pub use readiness::{ReadinessOutcome, ReadinessPoller, ReadyWorkload};
pub use report::{CycleCounters, ReachabilityMatrix};
pub use tester::PairwiseTester;
