//! Probe workload provisioning and cleanup.
//!
//! Creation is idempotent: a conflict means the resource survived an
//! interrupted earlier cycle, so it is adopted and the cycle continues. Any
//! other creation error aborts the cycle. Cleanup deletes everything carrying
//! the netcheck label, whether this cycle created it or not.

use crate::cluster::{ClusterControlPlane, ClusterError};
use crate::errors::NetcheckError;
use crate::models::{label_selector, ProbeWorkload};
use tracing::{debug, error, info, instrument, warn};

/// Result of a provisioning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    /// Resources newly created.
    pub created: usize,
    /// Resources that already existed and were adopted.
    pub adopted: usize,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub pods_deleted: usize,
    pub services_deleted: usize,
    /// Listings or deletions that failed.
    pub failed: usize,
}

/// Creates and deletes probe pods and services in one namespace.
pub struct Provisioner<'a> {
    cluster: &'a dyn ClusterControlPlane,
    namespace: &'a str,
}

/// Outcome of a single create call.
enum Created {
    New,
    Adopted,
}

fn tolerate_conflict(
    result: Result<(), ClusterError>,
    resource: &'static str,
    workload: &ProbeWorkload,
) -> Result<Created, NetcheckError> {
    match result {
        Ok(()) => Ok(Created::New),
        Err(e) if e.is_conflict() => {
            warn!(
                target: "netcheck.provisioner",
                resource,
                workload = %workload.name,
                node = %workload.node,
                "Probe resource already exists, adopting it"
            );
            Ok(Created::Adopted)
        }
        Err(source) => Err(NetcheckError::Provisioning {
            resource,
            workload: workload.name.clone(),
            source,
        }),
    }
}

impl<'a> Provisioner<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ClusterControlPlane, namespace: &'a str) -> Self {
        Self { cluster, namespace }
    }

    /// Create a pod and a service for every workload.
    ///
    /// All pods are created first, then all services.
    ///
    /// # Errors
    ///
    /// - `NetcheckError::Provisioning` - a create failed with anything but a conflict
    #[instrument(skip_all, fields(namespace = %self.namespace, workloads = workloads.len()))]
    pub async fn provision(
        &self,
        workloads: &[ProbeWorkload],
    ) -> Result<ProvisionSummary, NetcheckError> {
        let mut summary = ProvisionSummary::default();

        for workload in workloads {
            let result = self
                .cluster
                .create_workload_pod(self.namespace, workload)
                .await;
            summary.record(tolerate_conflict(result, "pod", workload)?);
        }
        info!(
            target: "netcheck.provisioner",
            count = workloads.len(),
            "Created probe pods"
        );

        for workload in workloads {
            let result = self
                .cluster
                .create_workload_service(self.namespace, workload)
                .await;
            summary.record(tolerate_conflict(result, "service", workload)?);
        }
        info!(
            target: "netcheck.provisioner",
            count = workloads.len(),
            "Created probe services"
        );

        Ok(summary)
    }

    /// Delete every netcheck pod and service in the namespace.
    ///
    /// Individual failures do not stop the pass; they are logged and counted.
    ///
    /// # Errors
    ///
    /// - `NetcheckError::Cleanup` - at least one listing or deletion failed
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn cleanup(&self) -> Result<CleanupSummary, NetcheckError> {
        let selector = label_selector();
        let mut summary = CleanupSummary::default();

        match self
            .cluster
            .list_workload_pods(self.namespace, &selector)
            .await
        {
            Ok(pods) => {
                info!(target: "netcheck.provisioner", count = pods.len(), "Deleting probe pods");
                for pod in pods {
                    let result = self
                        .cluster
                        .delete_workload_pod(self.namespace, &pod.name)
                        .await;
                    if summary.record_delete(result, "pod", &pod.name) {
                        summary.pods_deleted += 1;
                    }
                }
            }
            Err(e) => {
                error!(
                    target: "netcheck.provisioner",
                    error = %e,
                    "Failed to list probe pods for cleanup"
                );
                summary.failed += 1;
            }
        }

        match self
            .cluster
            .list_workload_services(self.namespace, &selector)
            .await
        {
            Ok(services) => {
                info!(
                    target: "netcheck.provisioner",
                    count = services.len(),
                    "Deleting probe services"
                );
                for service in services {
                    let result = self
                        .cluster
                        .delete_workload_service(self.namespace, &service)
                        .await;
                    if summary.record_delete(result, "service", &service) {
                        summary.services_deleted += 1;
                    }
                }
            }
            Err(e) => {
                error!(
                    target: "netcheck.provisioner",
                    error = %e,
                    "Failed to list probe services for cleanup"
                );
                summary.failed += 1;
            }
        }

        if summary.failed > 0 {
            return Err(NetcheckError::Cleanup {
                failed: summary.failed,
            });
        }
        Ok(summary)
    }
}

impl ProvisionSummary {
    fn record(&mut self, created: Created) {
        match created {
            Created::New => self.created += 1,
            Created::Adopted => self.adopted += 1,
        }
    }
}

impl CleanupSummary {
    /// Returns true if the resource is gone.
    fn record_delete(
        &mut self,
        result: Result<(), ClusterError>,
        resource: &'static str,
        name: &str,
    ) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(
                    target: "netcheck.provisioner",
                    resource,
                    name = %name,
                    "Probe resource already gone"
                );
                true
            }
            Err(e) => {
                error!(
                    target: "netcheck.provisioner",
                    resource,
                    name = %name,
                    error = %e,
                    "Failed to delete probe resource"
                );
                self.failed += 1;
                false
            }
        }
    }
}
