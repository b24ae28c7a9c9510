//! Managed-resource client for `CtrlDrift`
//!
//! [`PipelineExternal`] implements the observe/create/update/delete contract of
//! a managed resource. Observe gathers a fresh [`ObservedPipelineState`], runs the
//! evaluator and applies the job actions it returns. Create, update and delete
//! operate on the two long-running deployments.
//!
//! Gateway failures inside an operation are logged and collected, never
//! propagated: the next pass re-observes and retries. Only an invalid resource
//! fails an operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use api_types::CtrlDrift;
use api_types::DeletionPolicy;
use error_stack::Report;

use super::drift_signal::read_drift_signal;
use super::error::GatewayError;
use super::error::PipelineError;
use super::evaluator::evaluate;
use super::evaluator::provision_plan;
use super::evaluator::restart_plan;
use super::evaluator::teardown_plan;
use super::evaluator::ConvergenceAction;
use super::evaluator::Evaluation;
use super::observed::Observation;
use super::observed::ObservedPipelineState;
use super::settings::PipelineDefaults;
use super::settings::PipelineSettings;
use super::templates;
use super::templates::WorkloadKind;
use super::templates::WorkloadSpec;
use super::traits::ClusterGateway;
use super::traits::Propagation;

/// Connection details published for a resource. Always empty for pipelines.
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalObservation {
    pub exists: bool,
    pub up_to_date: bool,
    pub connection_details: ConnectionDetails,
    pub evaluation: Evaluation,
    /// Failed observations and failed actions of this pass.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalDeletion {
    pub errors: Vec<String>,
}

pub struct PipelineExternal<G> {
    gateway: Arc<G>,
    defaults: PipelineDefaults,
}

impl<G> PipelineExternal<G>
where
    G: ClusterGateway,
{
    pub fn new(gateway: Arc<G>, defaults: PipelineDefaults) -> Self {
        Self { gateway, defaults }
    }

    /// Resolve the settings of `resource`, rejecting resources without a name
    /// or with a `drift_file` that escapes the shared volume.
    pub fn settings(&self, resource: &CtrlDrift) -> Result<PipelineSettings, Report<PipelineError>> {
        let named = resource
            .metadata
            .name
            .as_deref()
            .is_some_and(|name| !name.is_empty());
        if !named {
            return Err(Report::new(PipelineError::InvalidResource {
                message: "metadata.name is missing".to_string(),
            }));
        }
        let settings = PipelineSettings::resolve(&resource.spec.for_provider, &self.defaults);
        settings
            .check_drift_file()
            .map_err(|message| Report::new(PipelineError::InvalidResource { message }))?;
        Ok(settings)
    }

    /// Observe the pipeline and apply the job actions the evaluator derives.
    pub async fn observe(
        &self,
        resource: &CtrlDrift,
    ) -> Result<ExternalObservation, Report<PipelineError>> {
        let settings = self.settings(resource)?;
        let state = self.observe_state(&settings).await;
        let evaluation = evaluate(&state, settings.drift_threshold);

        tracing::debug!(
            phase = %evaluation.phase,
            drift = %evaluation.drift,
            sample_count = ?evaluation.sample_count,
            "evaluated pipeline state"
        );

        let mut errors = evaluation.warnings.clone();
        errors.extend(self.apply(&settings, &evaluation.actions).await);

        Ok(ExternalObservation {
            exists: evaluation.resource_exists,
            up_to_date: evaluation.resource_up_to_date,
            connection_details: ConnectionDetails::new(),
            evaluation,
            errors,
        })
    }

    /// Provision the monitor and inference deployments.
    pub async fn create(
        &self,
        resource: &CtrlDrift,
    ) -> Result<ExternalCreation, Report<PipelineError>> {
        let settings = self.settings(resource)?;
        tracing::info!(namespace = %settings.namespace, "creating pipeline deployments");
        let errors = self.apply(&settings, &provision_plan()).await;
        Ok(ExternalCreation {
            connection_details: ConnectionDetails::new(),
            errors,
        })
    }

    /// Restart both deployments so they load the freshly converted model.
    pub async fn update(
        &self,
        resource: &CtrlDrift,
    ) -> Result<ExternalUpdate, Report<PipelineError>> {
        let settings = self.settings(resource)?;
        tracing::info!(namespace = %settings.namespace, "restarting pipeline deployments");
        let errors = self.apply(&settings, &restart_plan()).await;
        Ok(ExternalUpdate {
            connection_details: ConnectionDetails::new(),
            errors,
        })
    }

    /// Tear the pipeline down unless the resource orphans its workloads.
    pub async fn delete(
        &self,
        resource: &CtrlDrift,
    ) -> Result<ExternalDeletion, Report<PipelineError>> {
        let settings = self.settings(resource)?;
        if resource.spec.deletion_policy == DeletionPolicy::Orphan {
            tracing::info!(namespace = %settings.namespace, "orphaning pipeline workloads");
            return Ok(ExternalDeletion::default());
        }
        tracing::info!(namespace = %settings.namespace, "deleting pipeline workloads");
        let errors = self.apply(&settings, &teardown_plan()).await;
        Ok(ExternalDeletion { errors })
    }

    async fn observe_state(&self, settings: &PipelineSettings) -> ObservedPipelineState {
        let namespace = settings.namespace.as_str();

        let deployments = match self.gateway.list_deployments(namespace).await {
            Ok(deployments) => Observation::Known(deployments),
            Err(e) => {
                tracing::warn!(namespace, "failed to list deployments: {e:?}");
                Observation::Unknown(e.current_context().to_string())
            }
        };

        let drift = read_drift_signal(&settings.drift_artifact_path()).await;

        let jobs = match self.gateway.list_jobs(namespace).await {
            Ok(jobs) => Observation::Known(jobs),
            Err(e) => {
                tracing::warn!(namespace, "failed to list jobs: {e:?}");
                Observation::Unknown(e.current_context().to_string())
            }
        };

        ObservedPipelineState::from_listings(&settings.monitor_name, deployments, jobs, drift)
    }

    /// Apply `actions` in order, returning the error of each failed action.
    async fn apply(
        &self,
        settings: &PipelineSettings,
        actions: &[ConvergenceAction],
    ) -> Vec<String> {
        let mut errors = Vec::new();
        for action in actions {
            let result = match *action {
                ConvergenceAction::Create(kind) => self.create_workload(settings, kind).await,
                ConvergenceAction::Delete(kind) => self.delete_workload(settings, kind).await,
            };
            if let Err(e) = result {
                tracing::error!(?action, "failed to apply action: {e:?}");
                errors.push(format!("{action:?}: {}", e.current_context()));
            }
        }
        errors
    }

    async fn create_workload(
        &self,
        settings: &PipelineSettings,
        kind: WorkloadKind,
    ) -> Result<(), Report<GatewayError>> {
        let namespace = settings.namespace.as_str();
        let result = match templates::build(kind, settings) {
            WorkloadSpec::MonitorDeployment(deployment)
            | WorkloadSpec::InferenceDeployment(deployment) => {
                self.gateway.create_deployment(namespace, deployment).await
            }
            WorkloadSpec::TrainingJob(job) | WorkloadSpec::ConversionJob(job) => {
                self.gateway.create_job(namespace, job).await
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(namespace, name = settings.workload_name(kind), "created {kind}");
                Ok(())
            }
            Err(e) if matches!(e.current_context(), GatewayError::AlreadyExists { .. }) => {
                tracing::debug!(
                    namespace,
                    name = settings.workload_name(kind),
                    "{kind} already exists"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_workload(
        &self,
        settings: &PipelineSettings,
        kind: WorkloadKind,
    ) -> Result<(), Report<GatewayError>> {
        let namespace = settings.namespace.as_str();
        let name = settings.workload_name(kind);
        let result = if kind.is_job() {
            self.gateway
                .delete_job(namespace, name, Propagation::Background)
                .await
        } else {
            self.gateway.delete_deployment(namespace, name).await
        };

        match result {
            Ok(()) => {
                tracing::info!(namespace, name, "deleted {kind}");
                Ok(())
            }
            Err(e) if e.current_context().is_not_found() => {
                tracing::debug!(namespace, name, "{kind} already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use api_types::CtrlDriftParameters;
    use api_types::CtrlDriftSpec;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::pipeline::mock::GatewayCall;
    use crate::domain::pipeline::mock::MockClusterGateway;
    use crate::domain::pipeline::observed::JobSummary;

    struct Fixture {
        gateway: Arc<MockClusterGateway>,
        external: PipelineExternal<MockClusterGateway>,
        data_dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let data_dir = tempfile::tempdir().expect("should create data dir");
            let gateway = Arc::new(MockClusterGateway::new());
            let defaults = PipelineDefaults {
                data_path: data_dir.path().display().to_string(),
                ..Default::default()
            };
            let external = PipelineExternal::new(gateway.clone(), defaults);
            Self {
                gateway,
                external,
                data_dir,
            }
        }

        fn write_samples(&self, lines: usize) {
            let mut file = std::fs::File::create(self.data_dir.path().join("drift_data.csv"))
                .expect("should create artifact");
            file.write_all("1.0,2.0\n".repeat(lines).as_bytes())
                .expect("should write artifact");
        }
    }

    fn resource() -> CtrlDrift {
        CtrlDrift::new(
            "pipeline",
            CtrlDriftSpec {
                for_provider: CtrlDriftParameters::default(),
                ..Default::default()
            },
        )
    }

    fn create_job(name: &str) -> GatewayCall {
        GatewayCall::CreateJob {
            namespace: "default".to_string(),
            name: name.to_string(),
        }
    }

    fn delete_job(name: &str) -> GatewayCall {
        GatewayCall::DeleteJob {
            namespace: "default".to_string(),
            name: name.to_string(),
            propagation: Propagation::Background,
        }
    }

    #[test(tokio::test)]
    async fn create_then_observe_is_up_to_date() {
        let fixture = Fixture::new();

        let creation = fixture
            .external
            .create(&resource())
            .await
            .expect("create should succeed");
        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert_eq!(creation.connection_details, ConnectionDetails::new());
        assert_eq!(creation.errors, Vec::<String>::new());
        assert!(observation.exists);
        assert!(observation.up_to_date);
        assert!(observation.connection_details.is_empty());
    }

    #[test(tokio::test)]
    async fn observe_without_monitor_reports_missing() {
        let fixture = Fixture::new();

        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert!(!observation.exists);
        assert!(fixture.gateway.mutations().is_empty());
    }

    #[test(tokio::test)]
    async fn drift_above_threshold_creates_one_training_job() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        fixture.write_samples(3499);

        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert_eq!(observation.evaluation.sample_count, Some(3500));
        assert_eq!(fixture.gateway.mutations(), vec![create_job("training-job")]);
        assert!(observation.up_to_date);
    }

    #[test(tokio::test)]
    async fn succeeded_training_is_replaced_by_conversion() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        fixture.gateway.insert_job(
            "default",
            JobSummary {
                succeeded: 1,
                ..JobSummary::new("training-job")
            },
        );

        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert_eq!(
            fixture.gateway.mutations(),
            vec![delete_job("training-job"), create_job("converting-job")]
        );
        assert!(!observation.up_to_date);
    }

    #[test(tokio::test)]
    async fn running_conversion_causes_no_calls() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        fixture
            .gateway
            .insert_job("default", JobSummary::new("converting-job"));

        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert!(fixture.gateway.mutations().is_empty());
        assert!(observation.up_to_date);
    }

    #[test(tokio::test)]
    async fn update_restarts_both_deployments() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        fixture
            .gateway
            .insert_deployment("default", "python-tflite-deploy");

        let update = fixture
            .external
            .update(&resource())
            .await
            .expect("update should succeed");

        assert_eq!(update.errors, Vec::<String>::new());
        let calls = fixture.gateway.mutations();
        assert_eq!(calls.len(), 4);
        assert!(fixture.gateway.deployment("default", "drift-deploy").is_some());
        assert!(fixture
            .gateway
            .deployment("default", "python-tflite-deploy")
            .is_some());
    }

    #[test(tokio::test)]
    async fn delete_tolerates_missing_workloads() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");

        let deletion = fixture
            .external
            .delete(&resource())
            .await
            .expect("delete should succeed");

        assert_eq!(deletion.errors, Vec::<String>::new());
        assert_eq!(fixture.gateway.deployment("default", "drift-deploy"), None);
        assert_eq!(fixture.gateway.mutations().len(), 4);
    }

    #[test(tokio::test)]
    async fn orphan_policy_skips_teardown() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        let mut resource = resource();
        resource.spec.deletion_policy = DeletionPolicy::Orphan;

        fixture
            .external
            .delete(&resource)
            .await
            .expect("delete should succeed");

        assert!(fixture.gateway.calls().is_empty());
    }

    #[test(tokio::test)]
    async fn failed_mutations_are_collected_not_propagated() {
        let fixture = Fixture::new();
        fixture.gateway.set_mutation_error(Some(GatewayError::Timeout {
            operation: "create deployment".to_string(),
            seconds: 10,
        }));

        let creation = fixture
            .external
            .create(&resource())
            .await
            .expect("create should still return");

        assert_eq!(creation.errors.len(), 2);
    }

    #[test(tokio::test)]
    async fn unnamed_resource_is_rejected() {
        let fixture = Fixture::new();
        let mut resource = resource();
        resource.metadata.name = None;

        let err = fixture
            .external
            .observe(&resource)
            .await
            .expect_err("observe should fail");

        assert!(matches!(
            err.current_context(),
            PipelineError::InvalidResource { .. }
        ));
    }

    #[test(tokio::test)]
    async fn drift_file_outside_the_volume_is_rejected() {
        let fixture = Fixture::new();
        let mut resource = resource();
        resource.spec.for_provider.drift_file = Some("../../etc/passwd".to_string());

        let err = fixture
            .external
            .observe(&resource)
            .await
            .expect_err("observe should fail");

        assert!(matches!(
            err.current_context(),
            PipelineError::InvalidResource { .. }
        ));
        assert!(fixture.gateway.calls().is_empty());
    }

    #[test(tokio::test)]
    async fn resource_data_path_does_not_move_the_artifact() {
        let fixture = Fixture::new();
        fixture.gateway.insert_deployment("default", "drift-deploy");
        fixture.write_samples(5000);
        let mut resource = resource();
        resource.spec.for_provider.data_path = Some("/etc".to_string());

        let observation = fixture
            .external
            .observe(&resource)
            .await
            .expect("observe should succeed");

        assert_eq!(observation.evaluation.sample_count, Some(5001));
        assert_eq!(fixture.gateway.mutations(), vec![create_job("training-job")]);
    }

    #[test(tokio::test)]
    async fn unreachable_cluster_surfaces_errors_without_actions() {
        let fixture = Fixture::new();
        fixture.write_samples(5000);
        fixture.gateway.set_list_error(Some(GatewayError::Connection {
            message: "connection refused".to_string(),
        }));

        let observation = fixture
            .external
            .observe(&resource())
            .await
            .expect("observe should succeed");

        assert!(observation.exists);
        assert!(fixture.gateway.mutations().is_empty());
        assert!(!observation.errors.is_empty());
    }
}
