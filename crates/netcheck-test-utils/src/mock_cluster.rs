//! In-memory cluster control plane.
//!
//! Holds probe pods and services in maps, answers pod listings from
//! per-node phase scripts and answers probe commands from a table of HTTP
//! statuses. Every call is counted so tests can assert on call patterns.
//!
//! # Example
//!
//! ```rust,ignore
//! use netcheck_test_utils::MockCluster;
//!
//! let cluster = MockCluster::with_nodes(&["a", "b", "c"])
//!     .with_unscheduled_node("c")
//!     .with_http_status("a", "b", ProbeTarget::Service, 404);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use netcheck::cluster::{
    ClusterConnector, ClusterControlPlane, ClusterError, PodPhase, WorkloadStatus,
};
use netcheck::models::{sanitize_workload_name, ProbeTarget, ProbeWorkload};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pod status returned for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedPhase {
    pub phase: PodPhase,
    /// Whether the pod has a start time.
    pub started: bool,
}

impl ScriptedPhase {
    pub const UNSCHEDULED: Self = Self {
        phase: PodPhase::Pending,
        started: false,
    };
    pub const STARTING: Self = Self {
        phase: PodPhase::Pending,
        started: true,
    };
    pub const RUNNING: Self = Self {
        phase: PodPhase::Running,
        started: true,
    };
    pub const FAILED: Self = Self {
        phase: PodPhase::Failed,
        started: true,
    };
}

#[derive(Debug, Clone)]
struct MockPod {
    node: String,
    ip: String,
}

#[derive(Debug, Default)]
struct MockClusterInner {
    nodes: Vec<String>,
    list_nodes_fails: bool,

    pods: BTreeMap<String, MockPod>,
    services: BTreeSet<String>,
    next_ip: u32,
    ipv6_pod_ips: bool,

    pod_create_errors: HashMap<String, u16>,
    service_create_errors: HashMap<String, u16>,
    delete_errors: HashSet<String>,

    phase_scripts: HashMap<String, Vec<ScriptedPhase>>,
    http_status: HashMap<(String, String, ProbeTarget), u16>,
    exec_errors: HashSet<String>,
    exec_delay: Duration,

    pod_create_calls: usize,
    service_create_calls: usize,
    pod_list_calls: usize,
    service_list_calls: usize,
    pod_deletes: usize,
    service_deletes: usize,
    exec_calls: usize,
    exec_in_flight: usize,
    exec_peak: usize,
}

impl MockClusterInner {
    fn allocate_ip(&mut self) -> String {
        self.next_ip += 1;
        if self.ipv6_pod_ips {
            format!("fd00:10:244::{:x}", self.next_ip)
        } else {
            format!("10.0.{}.{}", self.next_ip / 250, self.next_ip % 250 + 1)
        }
    }

    fn node_for_host(&self, host: &str) -> Option<(String, ProbeTarget)> {
        if let Some(pod) = self.pods.get(host) {
            return Some((pod.node.clone(), ProbeTarget::Service));
        }
        self.pods
            .values()
            .find(|pod| pod.ip == host)
            .map(|pod| (pod.node.clone(), ProbeTarget::Direct))
    }
}

/// Scriptable in-memory [`ClusterControlPlane`].
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    inner: Arc<Mutex<MockClusterInner>>,
}

fn server_error(code: u16, what: &str) -> ClusterError {
    ClusterError::Api {
        code,
        message: format!("mock failure for {what}"),
    }
}

/// Workload name the planner assigns to `node` (no collisions assumed).
#[must_use]
pub fn workload_name(node: &str) -> String {
    sanitize_workload_name(node)
}

impl MockCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock cluster with the given nodes and nothing else.
    #[must_use]
    pub fn with_nodes(nodes: &[&str]) -> Self {
        let cluster = Self::new();
        cluster.inner.lock().unwrap().nodes = nodes.iter().map(ToString::to_string).collect();
        cluster
    }

    /// Hand out IPv6 pod IPs instead of IPv4 ones.
    #[must_use]
    pub fn with_ipv6_pod_ips(self) -> Self {
        self.inner.lock().unwrap().ipv6_pod_ips = true;
        self
    }

    /// Fail node listing.
    #[must_use]
    pub fn with_list_nodes_error(self) -> Self {
        self.inner.lock().unwrap().list_nodes_fails = true;
        self
    }

    /// Pre-create the pod and service for `node`, as left by a crashed cycle.
    #[must_use]
    pub fn with_existing_workload(self, node: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let name = workload_name(node);
            let ip = inner.allocate_ip();
            inner.pods.insert(
                name.clone(),
                MockPod {
                    node: node.to_string(),
                    ip,
                },
            );
            inner.services.insert(name);
        }
        self
    }

    /// Fail pod creation for `node` with an API error of `code`.
    #[must_use]
    pub fn with_pod_create_error(self, node: &str, code: u16) -> Self {
        self.inner
            .lock()
            .unwrap()
            .pod_create_errors
            .insert(workload_name(node), code);
        self
    }

    /// Fail service creation for `node` with an API error of `code`.
    #[must_use]
    pub fn with_service_create_error(self, node: &str, code: u16) -> Self {
        self.inner
            .lock()
            .unwrap()
            .service_create_errors
            .insert(workload_name(node), code);
        self
    }

    /// Fail deletion of the pod and service named `name`.
    #[must_use]
    pub fn with_delete_error(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .delete_errors
            .insert(name.to_string());
        self
    }

    /// Statuses for `node`'s pod, one per pod listing; the last one repeats.
    ///
    /// Nodes without a script report Running from the first listing.
    #[must_use]
    pub fn with_phase_script(self, node: &str, script: Vec<ScriptedPhase>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .phase_scripts
            .insert(node.to_string(), script);
        self
    }

    /// `node`'s pod is accepted but never scheduled.
    #[must_use]
    pub fn with_unscheduled_node(self, node: &str) -> Self {
        self.with_phase_script(node, vec![ScriptedPhase::UNSCHEDULED])
    }

    /// HTTP status seen by `from` when probing `to` through `target`.
    /// Unlisted pairs answer 200.
    #[must_use]
    pub fn with_http_status(self, from: &str, to: &str, target: ProbeTarget, status: u16) -> Self {
        self.inner
            .lock()
            .unwrap()
            .http_status
            .insert((from.to_string(), to.to_string(), target), status);
        self
    }

    /// Remote commands in `from`'s pod fail to run at all.
    #[must_use]
    pub fn with_exec_error(self, from: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .exec_errors
            .insert(from.to_string());
        self
    }

    /// Every remote command takes `delay`.
    #[must_use]
    pub fn with_exec_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().exec_delay = delay;
        self
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().pods.keys().cloned().collect()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().services.iter().cloned().collect()
    }

    /// Pod create calls, including conflicts and failures.
    pub fn pod_create_calls(&self) -> usize {
        self.inner.lock().unwrap().pod_create_calls
    }

    /// Service create calls, including conflicts and failures.
    pub fn service_create_calls(&self) -> usize {
        self.inner.lock().unwrap().service_create_calls
    }

    pub fn pod_list_calls(&self) -> usize {
        self.inner.lock().unwrap().pod_list_calls
    }

    /// Service listings; only cleanup lists services, once per pass.
    pub fn cleanup_passes(&self) -> usize {
        self.inner.lock().unwrap().service_list_calls
    }

    pub fn pod_deletes(&self) -> usize {
        self.inner.lock().unwrap().pod_deletes
    }

    pub fn service_deletes(&self) -> usize {
        self.inner.lock().unwrap().service_deletes
    }

    pub fn exec_calls(&self) -> usize {
        self.inner.lock().unwrap().exec_calls
    }

    /// Highest number of remote commands running at once.
    pub fn peak_exec_in_flight(&self) -> usize {
        self.inner.lock().unwrap().exec_peak
    }
}

#[async_trait]
impl ClusterControlPlane for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let inner = self.inner.lock().unwrap();
        if inner.list_nodes_fails {
            return Err(ClusterError::Transport("mock node listing failed".to_string()));
        }
        Ok(inner.nodes.clone())
    }

    async fn create_workload_pod(
        &self,
        _namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        inner.pod_create_calls += 1;

        if let Some(&code) = inner.pod_create_errors.get(&workload.name) {
            return Err(server_error(code, &workload.name));
        }
        if inner.pods.contains_key(&workload.name) {
            return Err(ClusterError::AlreadyExists(workload.name.clone()));
        }
        let ip = inner.allocate_ip();
        inner.pods.insert(
            workload.name.clone(),
            MockPod {
                node: workload.node.clone(),
                ip,
            },
        );
        Ok(())
    }

    async fn create_workload_service(
        &self,
        _namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        inner.service_create_calls += 1;

        if let Some(&code) = inner.service_create_errors.get(&workload.name) {
            return Err(server_error(code, &workload.name));
        }
        if !inner.services.insert(workload.name.clone()) {
            return Err(ClusterError::AlreadyExists(workload.name.clone()));
        }
        Ok(())
    }

    async fn list_workload_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<WorkloadStatus>, ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        let tick = inner.pod_list_calls;
        inner.pod_list_calls += 1;

        let statuses = inner
            .pods
            .iter()
            .map(|(name, pod)| {
                let scripted = inner
                    .phase_scripts
                    .get(&pod.node)
                    .and_then(|script| script.get(tick).or_else(|| script.last()))
                    .copied()
                    .unwrap_or(ScriptedPhase::RUNNING);
                WorkloadStatus {
                    name: name.clone(),
                    phase: scripted.phase,
                    start_time: scripted.started.then(Utc::now),
                    pod_ip: (scripted.phase == PodPhase::Running).then(|| pod.ip.clone()),
                }
            })
            .collect();
        Ok(statuses)
    }

    async fn list_workload_services(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        inner.service_list_calls += 1;
        Ok(inner.services.iter().cloned().collect())
    }

    async fn delete_workload_pod(&self, _namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.delete_errors.contains(name) {
            return Err(server_error(500, name));
        }
        match inner.pods.remove(name) {
            Some(_) => {
                inner.pod_deletes += 1;
                Ok(())
            }
            None => Err(ClusterError::NotFound(name.to_string())),
        }
    }

    async fn delete_workload_service(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.delete_errors.contains(name) {
            return Err(server_error(500, name));
        }
        if inner.services.remove(name) {
            inner.service_deletes += 1;
            Ok(())
        } else {
            Err(ClusterError::NotFound(name.to_string()))
        }
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        command: &[String],
    ) -> Result<String, ClusterError> {
        let (output, delay) = {
            let mut inner = self.inner.lock().unwrap();
            inner.exec_calls += 1;

            let from = inner
                .pods
                .get(pod)
                .map(|p| p.node.clone())
                .ok_or_else(|| ClusterError::NotFound(pod.to_string()))?;
            if inner.exec_errors.contains(&from) {
                return Err(ClusterError::Exec(format!("mock exec failure in {pod}")));
            }

            let host = command
                .last()
                .map(|url| {
                    url.trim_start_matches("http://")
                        .trim_end_matches('/')
                        .trim_start_matches('[')
                        .trim_end_matches(']')
                })
                .unwrap_or_default();
            let status = match inner.node_for_host(host) {
                Some((to, target)) => inner
                    .http_status
                    .get(&(from, to, target))
                    .copied()
                    .unwrap_or(200),
                None => 0,
            };

            inner.exec_in_flight += 1;
            inner.exec_peak = inner.exec_peak.max(inner.exec_in_flight);
            (format!("netcheck_status={status:03}"), inner.exec_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.lock().unwrap().exec_in_flight -= 1;
        Ok(output)
    }
}

/// Connector handing out a shared [`MockCluster`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    cluster: MockCluster,
    fail: bool,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    #[must_use]
    pub fn new(cluster: MockCluster) -> Self {
        Self {
            cluster,
            fail: false,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connector whose credentials never load.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(MockCluster::new())
        }
    }

    /// Number of connect attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterControlPlane>, ClusterError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClusterError::Credentials(
                "mock credentials unavailable".to_string(),
            ));
        }
        Ok(Arc::new(self.cluster.clone()))
    }
}
