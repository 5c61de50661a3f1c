//! Domain types for the connectivity check.
//!
//! A [`ProbeWorkload`] is derived 1:1 from a cluster node and owns one pod
//! and one service. Pair results are keyed by [`PairKey`], an ordered pair of
//! node identifiers.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Label key identifying resources owned by netcheck.
pub const APP_LABEL_KEY: &str = "app";

/// Label value identifying resources owned by netcheck.
pub const APP_LABEL_VALUE: &str = "netcheck";

/// Label key carrying the workload name (also the service selector).
pub const RUN_LABEL_KEY: &str = "run";

/// Prefix for every probe workload name.
pub const WORKLOAD_NAME_PREFIX: &str = "netcheck-";

/// Kubernetes DNS-1035 label length limit (services).
pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// Port the probe container listens on and the service exposes.
pub const PROBE_PORT: i32 = 80;

/// Label selector matching every netcheck-owned pod and service.
#[must_use]
pub fn label_selector() -> String {
    format!("{APP_LABEL_KEY}={APP_LABEL_VALUE}")
}

/// Probe pod + service deployed on a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeWorkload {
    /// Node identifier the workload is pinned to.
    pub node: String,
    /// Sanitized resource name shared by the pod and the service.
    pub name: String,
    /// Container image serving HTTP on [`PROBE_PORT`].
    pub image: String,
}

impl ProbeWorkload {
    /// Labels applied to both the pod and the service.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string()),
            (RUN_LABEL_KEY.to_string(), self.name.clone()),
        ])
    }

    /// URL reaching this workload through its service name.
    #[must_use]
    pub fn service_url(&self) -> String {
        format!("http://{}/", self.name)
    }
}

/// Derive the resource name for a node's probe workload.
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with `-`, and truncates
/// to the resource name limit without leaving a trailing `-`.
#[must_use]
pub fn sanitize_workload_name(node: &str) -> String {
    let body: String = node
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut name = format!("{WORKLOAD_NAME_PREFIX}{body}");
    name.truncate(MAX_RESOURCE_NAME_LEN);
    let trimmed = name.trim_end_matches('-').len();
    name.truncate(trimmed);
    name
}

/// Plan one probe workload per node.
///
/// Nodes whose sanitized names collide get a numeric suffix so that every
/// workload still owns exactly one pod and one service.
#[must_use]
pub fn plan_workloads(nodes: &[String], image: &str) -> Vec<ProbeWorkload> {
    let mut taken = HashSet::new();
    let mut workloads = Vec::with_capacity(nodes.len());

    for node in nodes {
        let base = sanitize_workload_name(node);
        let mut name = base.clone();
        let mut suffix = 2u32;
        while taken.contains(&name) {
            let tail = format!("-{suffix}");
            let mut head = base.clone();
            head.truncate(MAX_RESOURCE_NAME_LEN.saturating_sub(tail.len()));
            name = format!("{}{tail}", head.trim_end_matches('-'));
            suffix += 1;
        }
        taken.insert(name.clone());

        workloads.push(ProbeWorkload {
            node: node.clone(),
            name,
            image: image.to_string(),
        });
    }

    workloads
}

/// Per-tick readiness of a probe workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadinessState {
    /// Accepted but not yet assigned a start time.
    Scheduling,
    /// Started, container not running yet.
    Starting,
    /// Container running; the node is a test subject.
    Running,
    /// Any other phase.
    Failed,
}

/// Which address of the target workload a probe exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTarget {
    /// The workload's service name (cluster DNS + service routing).
    Service,
    /// The workload's pod IP.
    Direct,
}

impl ProbeTarget {
    /// Short outcome name used in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProbeTarget::Service => "svc",
            ProbeTarget::Direct => "direct",
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The target answered with HTTP 200.
    Ok,
    /// Any other status, a connect timeout, or no answer at all.
    Fail,
}

/// Ordered pair of node identifiers (from, to).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    /// Node whose pod runs the request.
    pub from: String,
    /// Node whose workload is being reached.
    pub to: String,
}

impl PairKey {
    /// Pair from `from` to `to`; `PairKey::new(a, b) != PairKey::new(b, a)`.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Named probe outcomes for one ordered pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReachabilityResult {
    outcomes: BTreeMap<ProbeTarget, ProbeOutcome>,
}

impl ReachabilityResult {
    /// Empty result with no outcomes recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one probe outcome.
    #[must_use]
    pub fn with(mut self, target: ProbeTarget, outcome: ProbeOutcome) -> Self {
        self.outcomes.insert(target, outcome);
        self
    }

    #[must_use]
    pub fn outcomes(&self) -> &BTreeMap<ProbeTarget, ProbeOutcome> {
        &self.outcomes
    }

    /// True iff every recorded probe succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcomes.values().all(|o| *o == ProbeOutcome::Ok)
    }

    /// Names of failing probes, sorted.
    #[must_use]
    pub fn failing(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == ProbeOutcome::Fail)
            .map(|(target, _)| target.name())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(
            sanitize_workload_name("Node_1.example.com"),
            "netcheck-node-1-example-com"
        );
    }

    #[test]
    fn test_sanitize_truncates_without_trailing_dash() {
        let node = format!("{}-{}", "a".repeat(53), "b".repeat(20));
        let name = sanitize_workload_name(&node);
        assert!(name.len() <= MAX_RESOURCE_NAME_LEN);
        assert!(!name.ends_with('-'));
        assert!(name.starts_with(WORKLOAD_NAME_PREFIX));
    }

    #[test]
    fn test_plan_workloads_disambiguates_collisions() {
        let nodes = vec!["node.a".to_string(), "node_a".to_string(), "node-a".to_string()];
        let workloads = plan_workloads(&nodes, "nginx");

        let names: Vec<_> = workloads.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["netcheck-node-a", "netcheck-node-a-2", "netcheck-node-a-3"]
        );
        assert!(workloads.iter().all(|w| w.image == "nginx"));
    }

    #[test]
    fn test_workload_labels_and_service_url() {
        let workload = plan_workloads(&["worker-1".to_string()], "nginx")
            .pop()
            .unwrap();
        let labels = workload.labels();
        assert_eq!(labels.get("app").map(String::as_str), Some("netcheck"));
        assert_eq!(
            labels.get("run").map(String::as_str),
            Some("netcheck-worker-1")
        );
        assert_eq!(workload.service_url(), "http://netcheck-worker-1/");
    }

    #[test]
    fn test_label_selector() {
        assert_eq!(label_selector(), "app=netcheck");
    }

    #[test]
    fn test_reachability_result_failing_names_are_sorted() {
        let result = ReachabilityResult::new()
            .with(ProbeTarget::Service, ProbeOutcome::Fail)
            .with(ProbeTarget::Direct, ProbeOutcome::Fail);
        assert!(!result.is_ok());
        assert_eq!(result.failing(), vec!["direct", "svc"]);
    }

    #[test]
    fn test_reachability_result_all_ok() {
        let result = ReachabilityResult::new()
            .with(ProbeTarget::Service, ProbeOutcome::Ok)
            .with(ProbeTarget::Direct, ProbeOutcome::Ok);
        assert!(result.is_ok());
        assert!(result.failing().is_empty());
    }
}
