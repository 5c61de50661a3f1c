//! netcheck configuration.
//!
//! Flags are parsed with clap; every flag also reads a `NETCHECK_*`
//! environment variable. [`Config::from_args`] validates the raw flags into
//! a [`Config`].

use crate::cluster::CredentialSource;
use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default probe image (anything answering HTTP 200 on port 80).
pub const DEFAULT_IMAGE: &str = "nginx";

/// Default namespace for probe workloads.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default port for the metrics and health server.
pub const DEFAULT_METRICS_PORT: u16 = 8000;

/// Default pause between cycles in continuous mode (15 minutes).
pub const DEFAULT_INTERVAL_SECONDS: u64 = 15 * 60;

/// Default readiness poll interval.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

/// Default total readiness budget.
pub const DEFAULT_READY_TIMEOUT_SECONDS: u64 = 120;

/// Default budget for the Scheduling phase.
pub const DEFAULT_SCHEDULE_TIMEOUT_SECONDS: u64 = 15;

/// Default per-probe connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Default number of pair tests in flight.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Reachability report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

/// Command-line flags.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netcheck",
    about = "Checks network connectivity between pods and services on all hosts"
)]
pub struct Args {
    /// Check once and exit
    #[arg(long, env = "NETCHECK_ONCE")]
    pub once: bool,

    /// Image for the probe pods; must serve HTTP 200 on port 80 and ship curl
    #[arg(long, env = "NETCHECK_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Namespace the probe pods and services are created in
    #[arg(long, env = "NETCHECK_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Kubeconfig file; in-cluster credentials are used when omitted
    #[arg(long = "config", alias = "kubeconfig", env = "NETCHECK_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Port for the Prometheus metrics and health endpoints
    #[arg(long, env = "NETCHECK_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Address the metrics server binds to
    #[arg(long, env = "NETCHECK_METRICS_BIND", default_value = "0.0.0.0")]
    pub metrics_bind: String,

    /// Seconds between cycles in continuous mode
    #[arg(long, env = "NETCHECK_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL_SECONDS)]
    pub interval_secs: u64,

    /// Seconds between readiness polls
    #[arg(long, env = "NETCHECK_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECONDS)]
    pub poll_interval_secs: u64,

    /// Total seconds to wait for probe pods to become ready
    #[arg(long, env = "NETCHECK_READY_TIMEOUT_SECS", default_value_t = DEFAULT_READY_TIMEOUT_SECONDS)]
    pub ready_timeout_secs: u64,

    /// Seconds a probe pod may remain unscheduled
    #[arg(long, env = "NETCHECK_SCHEDULE_TIMEOUT_SECS", default_value_t = DEFAULT_SCHEDULE_TIMEOUT_SECONDS)]
    pub schedule_timeout_secs: u64,

    /// Connect timeout for each HTTP probe
    #[arg(long, env = "NETCHECK_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECONDS)]
    pub connect_timeout_secs: u64,

    /// Maximum pair tests in flight
    #[arg(long, env = "NETCHECK_MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Only probe service addresses, skip pod IPs
    #[arg(long, env = "NETCHECK_NO_DIRECT_PROBE")]
    pub no_direct_probe: bool,

    /// Log output format
    #[arg(long, env = "NETCHECK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Reachability report format
    #[arg(long, env = "NETCHECK_REPORT_FORMAT", value_enum, default_value_t = ReportFormat::Table)]
    pub report_format: ReportFormat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid probe image: {0}")]
    InvalidImage(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid metrics bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid timing configuration: {0}")]
    InvalidTiming(String),

    #[error("Invalid concurrency configuration: {0}")]
    InvalidConcurrency(String),
}

/// Readiness wait budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessBudget {
    /// Pause before every status listing.
    pub poll_interval: Duration,
    /// Total wait budget.
    pub ready_timeout: Duration,
    /// Sub-budget for the Scheduling phase.
    pub schedule_timeout: Duration,
}

impl Default for ReadinessBudget {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECONDS),
            schedule_timeout: Duration::from_secs(DEFAULT_SCHEDULE_TIMEOUT_SECONDS),
        }
    }
}

/// Probe settings for pair tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    /// Also probe the target's pod IP.
    pub direct_probe: bool,
    pub max_in_flight: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            direct_probe: true,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Validated netcheck configuration.
#[derive(Clone)]
pub struct Config {
    /// Run a single cycle and exit.
    pub once: bool,
    pub image: String,
    pub namespace: String,
    pub credentials: CredentialSource,
    /// Metrics/health server address (continuous mode only).
    pub metrics_address: SocketAddr,
    /// Pause between cycles.
    pub interval: Duration,
    pub readiness: ReadinessBudget,
    pub probe: ProbeSettings,
    pub log_format: LogFormat,
    pub report_format: ReportFormat,
}

/// Kubeconfig contents are never printed, only where they come from.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = match &self.credentials {
            CredentialSource::InCluster => "in-cluster".to_string(),
            CredentialSource::Kubeconfig(path) => path.display().to_string(),
        };
        f.debug_struct("Config")
            .field("once", &self.once)
            .field("image", &self.image)
            .field("namespace", &self.namespace)
            .field("credentials", &credentials)
            .field("metrics_address", &self.metrics_address)
            .field("interval", &self.interval)
            .field("readiness", &self.readiness)
            .field("probe", &self.probe)
            .field("log_format", &self.log_format)
            .field("report_format", &self.report_format)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            once: false,
            image: DEFAULT_IMAGE.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            credentials: CredentialSource::InCluster,
            metrics_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT)),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            readiness: ReadinessBudget::default(),
            probe: ProbeSettings::default(),
            log_format: LogFormat::Text,
            report_format: ReportFormat::Table,
        }
    }
}

/// Reject zero durations with a message naming the flag.
fn positive_secs(flag: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidTiming(format!(
            "{flag} must be greater than 0"
        )));
    }
    Ok(Duration::from_secs(value))
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !value.is_empty()
        && value.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}

impl Config {
    /// Parse flags from the process arguments and environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args(Args::parse())
    }

    /// Validate parsed flags.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let image = args.image.trim().to_string();
        if image.is_empty() {
            return Err(ConfigError::InvalidImage(
                "--image must not be empty".to_string(),
            ));
        }

        if !is_dns_label(&args.namespace) {
            return Err(ConfigError::InvalidNamespace(format!(
                "--namespace must be a valid DNS label, got '{}'",
                args.namespace
            )));
        }

        let bind_ip: IpAddr = args.metrics_bind.parse().map_err(|e| {
            ConfigError::InvalidBindAddress(format!(
                "--metrics-bind must be an IP address, got '{}': {}",
                args.metrics_bind, e
            ))
        })?;

        let interval = positive_secs("--interval-secs", args.interval_secs)?;
        let poll_interval = positive_secs("--poll-interval-secs", args.poll_interval_secs)?;
        let ready_timeout = positive_secs("--ready-timeout-secs", args.ready_timeout_secs)?;
        let schedule_timeout =
            positive_secs("--schedule-timeout-secs", args.schedule_timeout_secs)?;
        let connect_timeout = positive_secs("--connect-timeout-secs", args.connect_timeout_secs)?;

        if schedule_timeout > ready_timeout {
            return Err(ConfigError::InvalidTiming(format!(
                "--schedule-timeout-secs ({}) must not exceed --ready-timeout-secs ({})",
                args.schedule_timeout_secs, args.ready_timeout_secs
            )));
        }

        if args.max_in_flight == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "--max-in-flight must be greater than 0".to_string(),
            ));
        }

        let credentials = match args.kubeconfig {
            Some(path) => CredentialSource::Kubeconfig(path),
            None => CredentialSource::InCluster,
        };

        Ok(Config {
            once: args.once,
            image,
            namespace: args.namespace,
            credentials,
            metrics_address: SocketAddr::new(bind_ip, args.metrics_port),
            interval,
            readiness: ReadinessBudget {
                poll_interval,
                ready_timeout,
                schedule_timeout,
            },
            probe: ProbeSettings {
                connect_timeout,
                direct_probe: !args.no_direct_probe,
                max_in_flight: args.max_in_flight,
            },
            log_format: args.log_format,
            report_format: args.report_format,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["netcheck"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).expect("flags should parse"))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).expect("defaults should be valid");

        assert!(!config.once);
        assert_eq!(config.image, "nginx");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.credentials, CredentialSource::InCluster);
        assert_eq!(config.metrics_address.port(), DEFAULT_METRICS_PORT);
        assert_eq!(config.interval, Duration::from_secs(900));
        assert_eq!(config.readiness, ReadinessBudget::default());
        assert_eq!(config.probe, ProbeSettings::default());
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.report_format, ReportFormat::Table);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "--once",
            "--image",
            "registry.local/probe:1",
            "--namespace",
            "netcheck",
            "--config",
            "/etc/kube/config",
            "--metrics-port",
            "9100",
            "--max-in-flight",
            "4",
            "--no-direct-probe",
            "--report-format",
            "json",
        ])
        .expect("config should be valid");

        assert!(config.once);
        assert_eq!(config.image, "registry.local/probe:1");
        assert_eq!(config.namespace, "netcheck");
        assert_eq!(
            config.credentials,
            CredentialSource::Kubeconfig(PathBuf::from("/etc/kube/config"))
        );
        assert_eq!(config.metrics_address.port(), 9100);
        assert_eq!(config.probe.max_in_flight, 4);
        assert!(!config.probe.direct_probe);
        assert_eq!(config.report_format, ReportFormat::Json);
    }

    #[test]
    fn test_kubeconfig_alias() {
        let config = parse(&["--kubeconfig", "/tmp/kc"]).unwrap();
        assert_eq!(
            config.credentials,
            CredentialSource::Kubeconfig(PathBuf::from("/tmp/kc"))
        );
    }

    #[test]
    fn test_zero_durations_rejected() {
        for flag in [
            "--interval-secs",
            "--poll-interval-secs",
            "--ready-timeout-secs",
            "--schedule-timeout-secs",
            "--connect-timeout-secs",
        ] {
            let err = parse(&[flag, "0"]).expect_err("zero should be rejected");
            assert!(
                matches!(err, ConfigError::InvalidTiming(ref msg) if msg.contains(flag)),
                "unexpected error for {flag}: {err:?}"
            );
        }
    }

    #[test]
    fn test_schedule_timeout_must_fit_ready_timeout() {
        let err = parse(&["--schedule-timeout-secs", "200"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTiming(_)));

        let config = parse(&["--schedule-timeout-secs", "120"]).unwrap();
        assert_eq!(config.readiness.schedule_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_zero_max_in_flight_rejected() {
        let err = parse(&["--max-in-flight", "0"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency(_)));
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        // `=` keeps clap from reading a leading '-' as a flag
        for namespace in ["", "Has_Caps", "-leading", "trailing-"] {
            let flag = format!("--namespace={namespace}");
            let err = parse(&[flag.as_str()]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidNamespace(_)));
        }
    }

    #[test]
    fn test_dns_label_rules() {
        assert!(is_dns_label("netcheck"));
        assert!(is_dns_label("kube-system"));
        assert!(is_dns_label("a1"));
        assert!(!is_dns_label("-leading"));
        assert!(!is_dns_label("trailing-"));
        assert!(!is_dns_label("dots.not.allowed"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn test_blank_image_rejected() {
        let err = parse(&["--image", "  "]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidImage(_)));
    }

    #[test]
    fn test_invalid_bind_address_rejected() {
        let err = parse(&["--metrics-bind", "localhost"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddress(_)));
    }

    #[test]
    fn test_debug_output_names_credential_source() {
        let config = parse(&["--config", "/etc/kube/config"]).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("/etc/kube/config"));
        assert!(debug.contains("namespace"));
    }
}
