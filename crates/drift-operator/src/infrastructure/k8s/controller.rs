//! Reconciliation driver for `CtrlDrift` resources
//!
//! Each pass runs observe, then create when the monitor is missing or update
//! when a completion made the pipeline stale, and finally writes the status.
//! Passes repeat at the poll interval; deletion runs the teardown through a
//! finalizer before the resource goes away.

use std::sync::Arc;
use std::time::Duration;

use api_types::CtrlDrift;
use chrono::Utc;
use error_stack::Report;
use futures::StreamExt;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::runtime::controller::Action;
use kube::runtime::finalizer;
use kube::runtime::finalizer::Event;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::types::ReconcileError;
use crate::domain::pipeline::external::ExternalObservation;
use crate::domain::pipeline::status::build_status;
use crate::domain::pipeline::ClusterGateway;
use crate::domain::pipeline::PipelineError;
use crate::domain::pipeline::PipelineExternal;

pub const FINALIZER: &str = "mlops.driftprovider.io/cleanup";

pub struct ControllerContext<G> {
    pub client: Client,
    pub external: PipelineExternal<G>,
    pub poll_interval: Duration,
    pub error_requeue: Duration,
}

/// Result of one converging pass, before the status is written.
#[derive(Debug)]
pub struct PassReport {
    pub observation: ExternalObservation,
    pub created: bool,
    pub updated: bool,
    pub errors: Vec<String>,
}

/// Run the controller until `token` is cancelled.
pub async fn run<G>(ctx: Arc<ControllerContext<G>>, token: CancellationToken)
where
    G: ClusterGateway + 'static,
{
    let api: Api<CtrlDrift> = Api::all(ctx.client.clone());

    Controller::new(api, watcher::Config::default())
        .graceful_shutdown_on(async move { token.cancelled().await })
        .run(reconcile::<G>, error_policy::<G>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => {
                    tracing::debug!(resource = %object.name, "reconciled");
                }
                Err(e) => {
                    tracing::warn!("reconcile failed: {e}");
                }
            }
        })
        .await;

    tracing::info!("drift controller stopped");
}

#[tracing::instrument(skip_all, fields(resource = %resource.name_any()))]
async fn reconcile<G>(
    resource: Arc<CtrlDrift>,
    ctx: Arc<ControllerContext<G>>,
) -> Result<Action, ReconcileError>
where
    G: ClusterGateway + 'static,
{
    let api: Api<CtrlDrift> = Api::all(ctx.client.clone());
    let (api_ref, ctx_ref) = (&api, ctx.as_ref());

    finalizer(&api, FINALIZER, resource, |event| async move {
        match event {
            Event::Apply(resource) => apply(api_ref, &resource, ctx_ref).await,
            Event::Cleanup(resource) => cleanup(&resource, ctx_ref).await,
        }
    })
    .await
    .map_err(|e| match e {
        finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => e,
        other => ReconcileError::Finalizer {
            message: other.to_string(),
        },
    })
}

fn error_policy<G>(
    resource: Arc<CtrlDrift>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext<G>>,
) -> Action {
    tracing::warn!(resource = %resource.name_any(), "requeueing after error: {error}");
    Action::requeue(ctx.error_requeue)
}

async fn apply<G>(
    api: &Api<CtrlDrift>,
    resource: &CtrlDrift,
    ctx: &ControllerContext<G>,
) -> Result<Action, ReconcileError>
where
    G: ClusterGateway,
{
    let report = converge(&ctx.external, resource)
        .await
        .map_err(invalid_resource)?;

    let status = build_status(
        resource.status.as_ref(),
        &report.observation.evaluation,
        report.observation.exists,
        &report.errors,
        Utc::now(),
    );

    let name = resource.name_any();
    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await
    .map_err(|e| ReconcileError::StatusPatch {
        name: name.clone(),
        message: e.to_string(),
    })?;

    tracing::info!(
        phase = %report.observation.evaluation.phase,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        "pass complete"
    );

    Ok(Action::requeue(ctx.poll_interval))
}

async fn cleanup<G>(
    resource: &CtrlDrift,
    ctx: &ControllerContext<G>,
) -> Result<Action, ReconcileError>
where
    G: ClusterGateway,
{
    let deletion = ctx
        .external
        .delete(resource)
        .await
        .map_err(invalid_resource)?;

    if let Some(error) = deletion.errors.last() {
        return Err(ReconcileError::Teardown {
            message: error.clone(),
        });
    }
    Ok(Action::await_change())
}

/// Observe, then create or update as the observation demands.
pub async fn converge<G>(
    external: &PipelineExternal<G>,
    resource: &CtrlDrift,
) -> Result<PassReport, Report<PipelineError>>
where
    G: ClusterGateway,
{
    let observation = external.observe(resource).await?;
    let mut errors = observation.errors.clone();
    let mut created = false;
    let mut updated = false;

    if !observation.exists {
        let creation = external.create(resource).await?;
        errors.extend(creation.errors);
        created = true;
    } else if !observation.up_to_date {
        let update = external.update(resource).await?;
        errors.extend(update.errors);
        updated = true;
    }

    Ok(PassReport {
        observation,
        created,
        updated,
        errors,
    })
}

fn invalid_resource(report: Report<PipelineError>) -> ReconcileError {
    tracing::error!("rejecting resource: {report:?}");
    ReconcileError::InvalidResource {
        message: report.current_context().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use api_types::CtrlDriftSpec;
    use test_log::test;

    use super::*;
    use crate::domain::pipeline::mock::GatewayCall;
    use crate::domain::pipeline::mock::MockClusterGateway;
    use crate::domain::pipeline::observed::JobSummary;
    use crate::domain::pipeline::PipelineDefaults;

    fn external(
        gateway: &Arc<MockClusterGateway>,
        data_dir: &tempfile::TempDir,
    ) -> PipelineExternal<MockClusterGateway> {
        PipelineExternal::new(
            gateway.clone(),
            PipelineDefaults {
                data_path: data_dir.path().display().to_string(),
                ..Default::default()
            },
        )
    }

    fn resource() -> CtrlDrift {
        CtrlDrift::new("pipeline", CtrlDriftSpec::default())
    }

    #[test(tokio::test)]
    async fn first_pass_provisions_deployments() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let gateway = Arc::new(MockClusterGateway::new());

        let report = converge(&external(&gateway, &dir), &resource())
            .await
            .expect("pass should succeed");

        assert!(report.created);
        assert!(!report.updated);
        assert!(gateway.deployment("default", "drift-deploy").is_some());
        assert!(gateway
            .deployment("default", "python-tflite-deploy")
            .is_some());
    }

    #[test(tokio::test)]
    async fn completed_conversion_restarts_deployments() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let gateway = Arc::new(MockClusterGateway::new());
        gateway.insert_deployment("default", "drift-deploy");
        gateway.insert_deployment("default", "python-tflite-deploy");
        gateway.insert_job(
            "default",
            JobSummary {
                succeeded: 1,
                ..JobSummary::new("converting-job")
            },
        );

        let report = converge(&external(&gateway, &dir), &resource())
            .await
            .expect("pass should succeed");

        assert!(report.updated);
        assert_eq!(report.errors, Vec::<String>::new());
        let restarted = gateway
            .mutations()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::CreateDeployment { .. }))
            .count();
        assert_eq!(restarted, 2);
    }

    #[test(tokio::test)]
    async fn steady_pass_touches_nothing() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let gateway = Arc::new(MockClusterGateway::new());
        gateway.insert_deployment("default", "drift-deploy");

        let report = converge(&external(&gateway, &dir), &resource())
            .await
            .expect("pass should succeed");

        assert!(!report.created);
        assert!(!report.updated);
        assert!(gateway.mutations().is_empty());
    }
}
