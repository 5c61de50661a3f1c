//! Cluster control plane abstraction.
//!
//! Everything netcheck needs from the cluster API goes through
//! [`ClusterControlPlane`]: node listing, probe pod/service lifecycle, and
//! remote command execution. [`ClusterConnector`] produces a fresh control
//! plane handle per reconcile iteration so short-lived credentials are
//! reloaded every time.
//!
//! The production implementation lives in [`kube_client`]; tests use the
//! in-memory mock from `netcheck-test-utils`.

pub mod kube_client;

use crate::models::ProbeWorkload;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use kube_client::{install_crypto_provider, KubeConnector, KubeControlPlane};

/// Cluster API errors.
///
/// Only [`ClusterError::AlreadyExists`] is recoverable during provisioning.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Cluster API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Remote command failed: {0}")]
    Exec(String),

    #[error("Failed to load cluster credentials: {0}")]
    Credentials(String),

    #[error("Cluster transport error: {0}")]
    Transport(String),
}

impl ClusterError {
    /// True for create conflicts (resource left over from an earlier cycle).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

/// Reported pod phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase string reported by the API server.
    #[must_use]
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// Point-in-time status of a probe pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadStatus {
    /// Pod name (equals the workload name).
    pub name: String,
    pub phase: PodPhase,
    /// Set once the kubelet has accepted the pod.
    pub start_time: Option<DateTime<Utc>>,
    pub pod_ip: Option<String>,
}

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service-account credentials mounted into the pod.
    InCluster,
    /// Explicit kubeconfig file.
    Kubeconfig(PathBuf),
}

/// Cluster API operations used by a check cycle.
#[async_trait]
pub trait ClusterControlPlane: Send + Sync {
    /// List node identifiers.
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError>;

    /// Create the probe pod for a workload, pinned to its node.
    async fn create_workload_pod(
        &self,
        namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError>;

    /// Create the probe service for a workload.
    async fn create_workload_service(
        &self,
        namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError>;

    /// List probe pods matching a label selector.
    async fn list_workload_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<WorkloadStatus>, ClusterError>;

    /// List probe service names matching a label selector.
    async fn list_workload_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, ClusterError>;

    async fn delete_workload_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn delete_workload_service(&self, namespace: &str, name: &str)
        -> Result<(), ClusterError>;

    /// Run a command inside a pod and return its combined output.
    ///
    /// There is no timeout here; the command must bound itself.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> Result<String, ClusterError>;
}

/// Produces an authenticated control plane handle.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ClusterControlPlane>, ClusterError>;
}
