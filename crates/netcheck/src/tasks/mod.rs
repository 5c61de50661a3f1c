//! Long-running tasks.

pub mod reconcile;

pub use reconcile::{run_cycle, run_once, run_reconcile_loop};
