//! # netcheck Test Utilities
//!
//! Mocks and fixtures for exercising netcheck cycles without a cluster.
//!
//! - `mock_cluster` - scriptable in-memory cluster control plane and connector
//! - `recording_sink` - metrics sink that keeps what it was given
//! - `fixtures` - ready-made configs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use netcheck_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let cluster = MockCluster::with_nodes(&["a", "b"]);
//!     let sink = RecordingMetricsSink::new();
//!     let matrix = run_cycle(&cluster, &test_config(), &sink).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod mock_cluster;
pub mod recording_sink;

pub use fixtures::{loop_config, test_config, test_config_with_max_in_flight};
pub use mock_cluster::{workload_name, MockCluster, MockConnector, ScriptedPhase};
pub use recording_sink::RecordingMetricsSink;
