//! [`ClusterGateway`] backed by the Kubernetes API

use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::api::PropagationPolicy;
use kube::Api;
use kube::Client;
use kube::ResourceExt;

use crate::domain::pipeline::observed::DeploymentSummary;
use crate::domain::pipeline::observed::JobSummary;
use crate::domain::pipeline::ClusterGateway;
use crate::domain::pipeline::GatewayError;
use crate::domain::pipeline::GatewayResult;
use crate::domain::pipeline::Propagation;

const DEPLOYMENT: &str = "deployment";
const JOB: &str = "job";

pub struct KubeGateway {
    client: Client,
    call_timeout: Duration,
}

impl KubeGateway {
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Run one API call under the per-call timeout.
    async fn call<T>(
        &self,
        target: Target<'_>,
        request: impl Future<Output = Result<T, kube::Error>> + Send,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(self.call_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let context = classify(&target, &e);
                Err(Report::new(e).change_context(context))
            }
            Err(_) => Err(Report::new(GatewayError::Timeout {
                operation: target.operation(),
                seconds: self.call_timeout.as_secs(),
            })),
        }
    }
}

/// What a call operates on, for error reporting.
struct Target<'a> {
    verb: &'static str,
    kind: &'static str,
    namespace: &'a str,
    name: Option<&'a str>,
}

impl Target<'_> {
    fn operation(&self) -> String {
        match self.name {
            Some(name) => format!("{} {} {}/{}", self.verb, self.kind, self.namespace, name),
            None => format!("{} {}s in {}", self.verb, self.kind, self.namespace),
        }
    }
}

fn classify(target: &Target<'_>, error: &kube::Error) -> GatewayError {
    let name = target.name.unwrap_or_default().to_string();
    match error {
        kube::Error::Api(response) if response.code == 409 => GatewayError::AlreadyExists {
            kind: target.kind,
            name,
            namespace: target.namespace.to_string(),
        },
        kube::Error::Api(response) if response.code == 404 => GatewayError::NotFound {
            kind: target.kind,
            name,
            namespace: target.namespace.to_string(),
        },
        kube::Error::Api(response) => GatewayError::Api {
            operation: target.operation(),
            message: response.message.clone(),
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => GatewayError::Connection {
            message: error.to_string(),
        },
        _ => GatewayError::Api {
            operation: target.operation(),
            message: error.to_string(),
        },
    }
}

/// Reduce a job to the fields the evaluator reads.
pub fn summarize_job(job: &Job) -> JobSummary {
    let status = job.status.as_ref();
    let count = |value: Option<i32>| value.unwrap_or(0).max(0) as u32;
    JobSummary {
        name: job.name_any(),
        succeeded: count(status.and_then(|s| s.succeeded)),
        failed: count(status.and_then(|s| s.failed)),
        terminating: job.metadata.deletion_timestamp.is_some(),
    }
}

fn delete_params(propagation: Propagation) -> DeleteParams {
    let policy = match propagation {
        Propagation::Background => PropagationPolicy::Background,
        Propagation::Foreground => PropagationPolicy::Foreground,
        Propagation::Orphan => PropagationPolicy::Orphan,
    };
    DeleteParams {
        propagation_policy: Some(policy),
        ..Default::default()
    }
}

#[async_trait::async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_deployments(&self, namespace: &str) -> GatewayResult<Vec<DeploymentSummary>> {
        let target = Target {
            verb: "list",
            kind: DEPLOYMENT,
            namespace,
            name: None,
        };
        let api = self.deployments(namespace);
        let list = self.call(target, api.list(&ListParams::default())).await?;
        Ok(list
            .items
            .iter()
            .map(|d| DeploymentSummary { name: d.name_any() })
            .collect())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> GatewayResult<()> {
        let name = deployment.name_any();
        let target = Target {
            verb: "create",
            kind: DEPLOYMENT,
            namespace,
            name: Some(&name),
        };
        let api = self.deployments(namespace);
        self.call(target, api.create(&PostParams::default(), &deployment))
            .await
            .map(|_| ())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> GatewayResult<()> {
        let target = Target {
            verb: "delete",
            kind: DEPLOYMENT,
            namespace,
            name: Some(name),
        };
        let api = self.deployments(namespace);
        self.call(target, api.delete(name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }

    async fn list_jobs(&self, namespace: &str) -> GatewayResult<Vec<JobSummary>> {
        let target = Target {
            verb: "list",
            kind: JOB,
            namespace,
            name: None,
        };
        let api = self.jobs(namespace);
        let list = self.call(target, api.list(&ListParams::default())).await?;
        Ok(list.items.iter().map(summarize_job).collect())
    }

    async fn create_job(&self, namespace: &str, job: Job) -> GatewayResult<()> {
        let name = job.name_any();
        let target = Target {
            verb: "create",
            kind: JOB,
            namespace,
            name: Some(&name),
        };
        let api = self.jobs(namespace);
        self.call(target, api.create(&PostParams::default(), &job))
            .await
            .map(|_| ())
    }

    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> GatewayResult<()> {
        let target = Target {
            verb: "delete",
            kind: JOB,
            namespace,
            name: Some(name),
        };
        let api = self.jobs(namespace);
        self.call(target, api.delete(name, &delete_params(propagation)))
            .await
            .map(|_| ())
    }
}
