//! Pre-configured test data.

use netcheck::config::{Config, ProbeSettings, ReadinessBudget};
use std::time::Duration;

/// Single-shot config with the default budgets.
///
/// Pair with `#[tokio::test(start_paused = true)]`; the readiness poll
/// sleeps for real otherwise.
#[must_use]
pub fn test_config() -> Config {
    Config {
        once: true,
        namespace: "netcheck-test".to_string(),
        ..Config::default()
    }
}

/// [`test_config`] with the given pair-test concurrency.
#[must_use]
pub fn test_config_with_max_in_flight(max_in_flight: usize) -> Config {
    Config {
        probe: ProbeSettings {
            max_in_flight,
            ..ProbeSettings::default()
        },
        ..test_config()
    }
}

/// [`test_config`] with a short continuous-mode interval.
#[must_use]
pub fn loop_config(interval: Duration) -> Config {
    Config {
        once: false,
        interval,
        readiness: ReadinessBudget::default(),
        ..test_config()
    }
}
