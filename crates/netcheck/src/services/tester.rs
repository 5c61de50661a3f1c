//! All-pairs connectivity testing.
//!
//! Every ordered pair of ready nodes runs an HTTP probe from inside the
//! `from` pod towards the `to` workload's service name and, optionally, its
//! pod IP. Pair tests run on a demand-driven pool: up to `max_in_flight`
//! tests are in flight and a freed slot is refilled immediately with the
//! next pending pair.

use crate::cluster::ClusterControlPlane;
use crate::config::ProbeSettings;
use crate::errors::NetcheckError;
use crate::models::{PairKey, ProbeOutcome, ProbeTarget, ReachabilityResult};
use crate::services::readiness::ReadyWorkload;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Marker printed by the probe command in front of the HTTP status code.
pub const STATUS_MARKER: &str = "netcheck_status=";

/// Generate every ordered pair `(from, to)` with `from != to`.
pub fn generate_pairs<T: PartialEq>(nodes: &[T]) -> impl Iterator<Item = (&T, &T)> + '_ {
    nodes.iter().flat_map(move |from| {
        nodes
            .iter()
            .filter(move |to| *to != from)
            .map(move |to| (from, to))
    })
}

/// Run `task` over `items` with at most `max_in_flight` futures pending.
///
/// Items are started in input order; results come back in completion order.
/// The first error aborts the pool, dropping whatever is still in flight.
pub async fn run_bounded<I, F, Fut, T, E>(
    items: I,
    max_in_flight: usize,
    mut task: F,
) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut pending = items.into_iter();
    let mut in_flight = FuturesUnordered::new();

    for item in pending.by_ref().take(max_in_flight.max(1)) {
        in_flight.push(task(item));
    }

    let mut results = Vec::new();
    while let Some(result) = in_flight.next().await {
        results.push(result?);
        if let Some(item) = pending.next() {
            in_flight.push(task(item));
        }
    }
    Ok(results)
}

/// Build the probe command run inside the source pod.
#[must_use]
pub fn probe_command(url: &str, connect_timeout: Duration) -> Vec<String> {
    vec![
        "curl".to_string(),
        "-s".to_string(),
        "-o".to_string(),
        "/dev/null".to_string(),
        "-w".to_string(),
        format!("{STATUS_MARKER}%{{http_code}}"),
        "--connect-timeout".to_string(),
        connect_timeout.as_secs().to_string(),
        url.to_string(),
    ]
}

/// URL reaching a pod directly by IP. IPv6 literals are bracketed.
///
/// `None` if `pod_ip` is not an IP address.
#[must_use]
pub fn direct_url(pod_ip: &str) -> Option<String> {
    match pod_ip.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(format!("http://{v4}/")),
        IpAddr::V6(v6) => Some(format!("http://[{v6}]/")),
    }
}

/// `Ok` iff the command output reports HTTP status 200.
#[must_use]
pub fn classify_probe_output(output: &str) -> ProbeOutcome {
    let status = output
        .split_whitespace()
        .find_map(|token| token.strip_prefix(STATUS_MARKER));
    match status {
        Some("200") => ProbeOutcome::Ok,
        _ => ProbeOutcome::Fail,
    }
}

/// Runs the all-pairs test over the ready set.
pub struct PairwiseTester<'a> {
    cluster: &'a dyn ClusterControlPlane,
    namespace: &'a str,
    settings: ProbeSettings,
}

impl<'a> PairwiseTester<'a> {
    #[must_use]
    pub fn new(
        cluster: &'a dyn ClusterControlPlane,
        namespace: &'a str,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            cluster,
            namespace,
            settings,
        }
    }

    /// Targets probed for every pair.
    #[must_use]
    pub fn targets(&self) -> Vec<ProbeTarget> {
        if self.settings.direct_probe {
            vec![ProbeTarget::Service, ProbeTarget::Direct]
        } else {
            vec![ProbeTarget::Service]
        }
    }

    /// Test every ordered pair of ready workloads.
    ///
    /// A non-200 answer is a normal `Fail` outcome. A remote command that
    /// cannot run at all aborts the whole test.
    ///
    /// # Errors
    ///
    /// - `NetcheckError::PairTest` - a remote command failed
    #[instrument(skip_all, fields(namespace = %self.namespace, ready = ready.len()))]
    pub async fn run(
        &self,
        ready: &[ReadyWorkload],
    ) -> Result<BTreeMap<PairKey, ReachabilityResult>, NetcheckError> {
        let pair_count = ready.len() * ready.len().saturating_sub(1);
        info!(
            target: "netcheck.tester",
            pairs = pair_count,
            max_in_flight = self.settings.max_in_flight,
            "Starting pairwise connectivity test"
        );

        let results = run_bounded(
            generate_pairs(ready),
            self.settings.max_in_flight,
            |(from, to)| self.check_pair(from, to),
        )
        .await?;

        // Pairs are distinct by construction, so each key is written once.
        Ok(results.into_iter().collect())
    }

    async fn check_pair(
        &self,
        from: &ReadyWorkload,
        to: &ReadyWorkload,
    ) -> Result<(PairKey, ReachabilityResult), NetcheckError> {
        info!(
            target: "netcheck.tester",
            from = %from.node(),
            to = %to.node(),
            "Testing pair"
        );

        let mut result = ReachabilityResult::new();
        for target in self.targets() {
            let outcome = match self.target_url(target, to) {
                Some(url) => self.probe(from, to, &url).await?,
                None => {
                    debug!(
                        target: "netcheck.tester",
                        to = %to.node(),
                        pod_ip = ?to.pod_ip,
                        "Target pod has no usable IP, direct probe fails"
                    );
                    ProbeOutcome::Fail
                }
            };
            result = result.with(target, outcome);
        }

        Ok((PairKey::new(from.node(), to.node()), result))
    }

    fn target_url(&self, target: ProbeTarget, to: &ReadyWorkload) -> Option<String> {
        match target {
            ProbeTarget::Service => Some(to.workload.service_url()),
            ProbeTarget::Direct => to.pod_ip.as_deref().and_then(direct_url),
        }
    }

    async fn probe(
        &self,
        from: &ReadyWorkload,
        to: &ReadyWorkload,
        url: &str,
    ) -> Result<ProbeOutcome, NetcheckError> {
        let command = probe_command(url, self.settings.connect_timeout);
        let output = self
            .cluster
            .exec(self.namespace, &from.workload.name, &command)
            .await
            .map_err(|source| NetcheckError::PairTest {
                from: from.node().to_string(),
                to: to.node().to_string(),
                source,
            })?;

        let outcome = classify_probe_output(&output);
        debug!(
            target: "netcheck.tester",
            from = %from.node(),
            to = %to.node(),
            url = %url,
            outcome = ?outcome,
            "Probe finished"
        );
        Ok(outcome)
    }
}
