//! netcheck: pairwise node reachability checker for Kubernetes.
//!
//! Each cycle places one probe pod plus service on every node, waits for the
//! pods to start, then has every ready pod fetch every other pod over HTTP,
//! both through the service name and, by default, the pod IP. The outcome is
//! a reachability matrix of nodes by nodes.
//!
//! # Cycle
//!
//! ```text
//! list nodes -> provision -> wait for ready -> pairwise test -> report
//!                                                                 |
//!                              cleanup (always, every exit path) <-+
//! ```
//!
//! # Modules
//!
//! - [`cluster`] - Cluster control plane trait and its kube-backed adapter
//! - [`config`] - Command-line and environment configuration
//! - [`errors`] - Cycle error types
//! - [`models`] - Probe workloads, pair keys and results
//! - [`observability`] - Metrics sink, health and metrics endpoints
//! - [`services`] - Provisioner, readiness poller, tester, reporter
//! - [`tasks`] - Single-shot and continuous reconcile loop

pub mod cluster;
pub mod config;
pub mod errors;
pub mod models;
pub mod observability;
pub mod services;
pub mod tasks;
