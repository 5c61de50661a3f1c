//! Kubernetes-backed cluster control plane.
//!
//! Probe pods are pinned with required node affinity on `metadata.name` and
//! tolerate every taint, so control-plane and otherwise tainted nodes are
//! covered too.

use super::{
    ClusterConnector, ClusterControlPlane, ClusterError, CredentialSource, PodPhase,
    WorkloadStatus,
};
use crate::models::{ProbeWorkload, PROBE_PORT};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

/// Container name inside every probe pod.
const PROBE_CONTAINER_NAME: &str = "web";

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 409 => {
                ClusterError::AlreadyExists(response.message)
            }
            kube::Error::Api(response) if response.code == 404 => {
                ClusterError::NotFound(response.message)
            }
            kube::Error::Api(response) => ClusterError::Api {
                code: response.code,
                message: response.message,
            },
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

/// Build the probe pod manifest for a workload.
pub fn build_pod(workload: &ProbeWorkload) -> Result<Pod, ClusterError> {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": workload.name,
            "labels": workload.labels(),
        },
        "spec": {
            "containers": [{
                "name": PROBE_CONTAINER_NAME,
                "image": workload.image,
                "ports": [{ "name": "web", "containerPort": PROBE_PORT, "protocol": "TCP" }],
            }],
            "restartPolicy": "Always",
            "affinity": {
                "nodeAffinity": {
                    "requiredDuringSchedulingIgnoredDuringExecution": {
                        "nodeSelectorTerms": [{
                            "matchFields": [{
                                "key": "metadata.name",
                                "operator": "In",
                                "values": [workload.node],
                            }],
                        }],
                    },
                },
            },
            "tolerations": [{ "operator": "Exists" }],
        },
    }))
    .map_err(|e| ClusterError::Transport(format!("Invalid pod manifest: {e}")))
}

/// Build the probe service manifest for a workload.
pub fn build_service(workload: &ProbeWorkload) -> Result<Service, ClusterError> {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": workload.name,
            "labels": workload.labels(),
        },
        "spec": {
            "selector": workload.labels(),
            "ports": [{ "name": "web", "protocol": "TCP", "port": PROBE_PORT }],
        },
    }))
    .map_err(|e| ClusterError::Transport(format!("Invalid service manifest: {e}")))
}

/// Control plane backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn workload_status(pod: &Pod) -> WorkloadStatus {
    let status = pod.status.as_ref();
    WorkloadStatus {
        name: pod.name_any(),
        phase: PodPhase::parse(status.and_then(|s| s.phase.as_deref())),
        start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
    }
}

async fn read_stream<R>(reader: Option<R>) -> Result<String, ClusterError>
where
    R: AsyncRead + Unpin,
{
    let mut output = String::new();
    if let Some(mut reader) = reader {
        reader
            .read_to_string(&mut output)
            .await
            .map_err(|e| ClusterError::Exec(format!("Failed to read command output: {e}")))?;
    }
    Ok(output)
}

#[async_trait]
impl ClusterControlPlane for KubeControlPlane {
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    #[instrument(skip_all, fields(workload = %workload.name, node = %workload.node))]
    async fn create_workload_pod(
        &self,
        namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError> {
        let pod = build_pod(workload)?;
        self.pods(namespace)
            .create(&PostParams::default(), &pod)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(workload = %workload.name))]
    async fn create_workload_service(
        &self,
        namespace: &str,
        workload: &ProbeWorkload,
    ) -> Result<(), ClusterError> {
        let service = build_service(workload)?;
        self.services(namespace)
            .create(&PostParams::default(), &service)
            .await?;
        Ok(())
    }

    async fn list_workload_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<WorkloadStatus>, ClusterError> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items.iter().map(workload_status).collect())
    }

    async fn list_workload_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let list = self
            .services(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn delete_workload_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_workload_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(pod = %pod))]
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> Result<String, ClusterError> {
        let params = AttachParams::default()
            .container(PROBE_CONTAINER_NAME)
            .stdin(false)
            .stdout(true)
            .stderr(true)
            .tty(false);

        let mut attached = self
            .pods(namespace)
            .exec(pod, command.to_vec(), &params)
            .await?;

        let (stdout, stderr) = tokio::join!(
            read_stream(attached.stdout()),
            read_stream(attached.stderr())
        );

        attached
            .join()
            .await
            .map_err(|e| ClusterError::Exec(e.to_string()))?;

        let mut output = stdout?;
        output.push_str(&stderr?);
        debug!(target: "netcheck.cluster", output = %output, "Remote command finished");
        Ok(output)
    }
}

/// Install ring as the process-wide rustls crypto provider.
///
/// The dependency graph enables more than one rustls provider, so rustls
/// cannot pick one on its own. Safe to call repeatedly; later calls are
/// no-ops.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Builds a [`KubeControlPlane`] from in-cluster or kubeconfig credentials.
#[derive(Debug, Clone)]
pub struct KubeConnector {
    source: CredentialSource,
}

impl KubeConnector {
    #[must_use]
    pub fn new(source: CredentialSource) -> Self {
        Self { source }
    }

    async fn load_config(&self) -> Result<kube::Config, ClusterError> {
        match &self.source {
            CredentialSource::InCluster => kube::Config::incluster()
                .map_err(|e| ClusterError::Credentials(format!("In-cluster config: {e}"))),
            CredentialSource::Kubeconfig(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ClusterError::Credentials(format!(
                        "Failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::Credentials(format!("Kubeconfig: {e}")))
            }
        }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterControlPlane>, ClusterError> {
        install_crypto_provider();
        let config = self.load_config().await?;
        let client = Client::try_from(config)
            .map_err(|e| ClusterError::Transport(format!("Failed to build client: {e}")))?;
        Ok(Arc::new(KubeControlPlane::new(client)))
    }
}
