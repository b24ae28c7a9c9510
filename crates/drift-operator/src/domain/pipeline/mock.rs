//! In-memory cluster gateway for tests
//!
//! Keeps deployments and jobs in maps keyed by `(namespace, name)` and records
//! every call so tests can assert on the exact sequence of side effects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use error_stack::Report;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;

use super::error::GatewayError;
use super::error::GatewayResult;
use super::observed::DeploymentSummary;
use super::observed::JobSummary;
use super::traits::ClusterGateway;
use super::traits::Propagation;

type Key = (String, String);

/// A gateway call as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListDeployments {
        namespace: String,
    },
    CreateDeployment {
        namespace: String,
        name: String,
    },
    DeleteDeployment {
        namespace: String,
        name: String,
    },
    ListJobs {
        namespace: String,
    },
    CreateJob {
        namespace: String,
        name: String,
    },
    DeleteJob {
        namespace: String,
        name: String,
        propagation: Propagation,
    },
}

impl GatewayCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::ListDeployments { .. } | Self::ListJobs { .. })
    }
}

#[derive(Default)]
struct MockState {
    deployments: BTreeMap<Key, Deployment>,
    jobs: BTreeMap<Key, (Job, JobSummary)>,
    calls: Vec<GatewayCall>,
    list_error: Option<GatewayError>,
    mutation_error: Option<GatewayError>,
    retain_deleted_jobs: bool,
}

/// Mock cluster gateway for testing
#[derive(Clone, Default)]
pub struct MockClusterGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockClusterGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every list call fail with `error`.
    pub fn set_list_error(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().list_error = error;
    }

    /// Make every create and delete call fail with `error`.
    pub fn set_mutation_error(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().mutation_error = error;
    }

    /// Deleted jobs stay listed as terminating until [`finish_terminations`](Self::finish_terminations).
    pub fn set_retain_deleted_jobs(&self, enabled: bool) {
        self.state.lock().unwrap().retain_deleted_jobs = enabled;
    }

    /// Drop every job that is terminating.
    pub fn finish_terminations(&self) {
        self.state
            .lock()
            .unwrap()
            .jobs
            .retain(|_, (_, summary)| !summary.terminating);
    }

    /// Insert a job directly, bypassing the call log.
    pub fn insert_job(&self, namespace: &str, summary: JobSummary) {
        let key = (namespace.to_string(), summary.name.clone());
        self.state
            .lock()
            .unwrap()
            .jobs
            .insert(key, (Job::default(), summary));
    }

    /// Set the completion counters of an existing job.
    pub fn complete_job(&self, namespace: &str, name: &str, succeeded: u32, failed: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, summary)) = state.jobs.get_mut(&(namespace.to_string(), name.to_string())) {
            summary.succeeded = succeeded;
            summary.failed = failed;
        }
    }

    /// Insert a deployment directly, bypassing the call log.
    pub fn insert_deployment(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .deployments
            .insert((namespace.to_string(), name.to_string()), Deployment::default());
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(job, _)| job.clone())
    }

    pub fn job_summary(&self, namespace: &str, name: &str) -> Option<JobSummary> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(_, summary)| summary.clone())
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that create or delete something.
    pub fn mutations(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(GatewayCall::is_mutation)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

fn object_name(name: Option<&String>, kind: &str) -> GatewayResult<String> {
    name.cloned().ok_or_else(|| {
        Report::new(GatewayError::Api {
            operation: format!("create {kind}"),
            message: "metadata.name is required".to_string(),
        })
    })
}

#[async_trait::async_trait]
impl ClusterGateway for MockClusterGateway {
    async fn list_deployments(&self, namespace: &str) -> GatewayResult<Vec<DeploymentSummary>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::ListDeployments {
            namespace: namespace.to_string(),
        });
        if let Some(error) = state.list_error.clone() {
            return Err(Report::new(error));
        }
        Ok(state
            .deployments
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| DeploymentSummary { name: name.clone() })
            .collect())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> GatewayResult<()> {
        let name = object_name(deployment.metadata.name.as_ref(), "deployment")?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::CreateDeployment {
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        if let Some(error) = state.mutation_error.clone() {
            return Err(Report::new(error));
        }
        let key = (namespace.to_string(), name.clone());
        if state.deployments.contains_key(&key) {
            return Err(Report::new(GatewayError::AlreadyExists {
                kind: "deployment",
                name,
                namespace: namespace.to_string(),
            }));
        }
        state.deployments.insert(key, deployment);
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::DeleteDeployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if let Some(error) = state.mutation_error.clone() {
            return Err(Report::new(error));
        }
        match state
            .deployments
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(Report::new(GatewayError::NotFound {
                kind: "deployment",
                name: name.to_string(),
                namespace: namespace.to_string(),
            })),
        }
    }

    async fn list_jobs(&self, namespace: &str) -> GatewayResult<Vec<JobSummary>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::ListJobs {
            namespace: namespace.to_string(),
        });
        if let Some(error) = state.list_error.clone() {
            return Err(Report::new(error));
        }
        Ok(state
            .jobs
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, (_, summary))| summary.clone())
            .collect())
    }

    async fn create_job(&self, namespace: &str, job: Job) -> GatewayResult<()> {
        let name = object_name(job.metadata.name.as_ref(), "job")?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::CreateJob {
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        if let Some(error) = state.mutation_error.clone() {
            return Err(Report::new(error));
        }
        let key = (namespace.to_string(), name.clone());
        if state.jobs.contains_key(&key) {
            return Err(Report::new(GatewayError::AlreadyExists {
                kind: "job",
                name,
                namespace: namespace.to_string(),
            }));
        }
        let summary = JobSummary::new(name);
        state.jobs.insert(key, (job, summary));
        Ok(())
    }

    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::DeleteJob {
            namespace: namespace.to_string(),
            name: name.to_string(),
            propagation,
        });
        if let Some(error) = state.mutation_error.clone() {
            return Err(Report::new(error));
        }
        let key = (namespace.to_string(), name.to_string());
        if state.retain_deleted_jobs {
            if let Some((_, summary)) = state.jobs.get_mut(&key) {
                summary.terminating = true;
                return Ok(());
            }
        } else if state.jobs.remove(&key).is_some() {
            return Ok(());
        }
        Err(Report::new(GatewayError::NotFound {
            kind: "job",
            name: name.to_string(),
            namespace: namespace.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    fn named_job(name: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_create_fails_with_already_exists() {
        let gateway = MockClusterGateway::new();

        gateway
            .create_job("default", named_job("training-job"))
            .await
            .expect("first create should succeed");
        let err = gateway
            .create_job("default", named_job("training-job"))
            .await
            .expect_err("second create should fail");

        assert!(matches!(
            err.current_context(),
            GatewayError::AlreadyExists { .. }
        ));
    }

    #[tokio::test]
    async fn retained_jobs_turn_terminating() {
        let gateway = MockClusterGateway::new();
        gateway.set_retain_deleted_jobs(true);
        gateway.insert_job("default", JobSummary::new("training-job"));

        gateway
            .delete_job("default", "training-job", Propagation::Background)
            .await
            .expect("delete should succeed");

        let summary = gateway
            .job_summary("default", "training-job")
            .expect("job should still be listed");
        assert!(summary.terminating);

        gateway.finish_terminations();
        assert_eq!(gateway.job_summary("default", "training-job"), None);
    }

    #[tokio::test]
    async fn list_error_mode_fails_lists_only() {
        let gateway = MockClusterGateway::new();
        gateway.set_list_error(Some(GatewayError::Connection {
            message: "refused".to_string(),
        }));

        assert!(gateway.list_jobs("default").await.is_err());
        assert!(gateway
            .create_job("default", named_job("training-job"))
            .await
            .is_ok());
        assert_eq!(gateway.mutations().len(), 1);
    }
}
