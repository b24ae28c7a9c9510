//! Cluster access used by the pipeline

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;

use super::error::GatewayResult;
use super::observed::DeploymentSummary;
use super::observed::JobSummary;

/// Propagation policy for job deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Dependent pods are reclaimed by the garbage collector.
    #[default]
    Background,
    Foreground,
    Orphan,
}

/// Lists, creates and deletes pipeline workloads.
///
/// Implementations never deduplicate: creating an existing name fails with
/// [`GatewayError::AlreadyExists`](super::error::GatewayError::AlreadyExists).
#[async_trait::async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_deployments(&self, namespace: &str) -> GatewayResult<Vec<DeploymentSummary>>;

    async fn create_deployment(&self, namespace: &str, deployment: Deployment)
        -> GatewayResult<()>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> GatewayResult<()>;

    async fn list_jobs(&self, namespace: &str) -> GatewayResult<Vec<JobSummary>>;

    async fn create_job(&self, namespace: &str, job: Job) -> GatewayResult<()>;

    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> GatewayResult<()>;
}
