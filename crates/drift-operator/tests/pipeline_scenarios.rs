//! Multi-pass reconciliation scenarios against the in-memory gateway.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use api_types::CtrlDrift;
use api_types::CtrlDriftParameters;
use api_types::CtrlDriftSpec;
use drift_operator::k8s::controller::converge;
use drift_operator::k8s::controller::PassReport;
use drift_operator::pipeline::mock::GatewayCall;
use drift_operator::pipeline::mock::MockClusterGateway;
use drift_operator::pipeline::observed::JobSummary;
use drift_operator::pipeline::GatewayError;
use drift_operator::pipeline::PipelineDefaults;
use drift_operator::pipeline::PipelineExternal;
use drift_operator::pipeline::PipelinePhase;
use drift_operator::pipeline::Propagation;
use similar_asserts::assert_eq;
use test_log::test;

const NAMESPACE: &str = "ml";

struct Harness {
    gateway: Arc<MockClusterGateway>,
    external: PipelineExternal<MockClusterGateway>,
    resource: CtrlDrift,
    data_dir: tempfile::TempDir,
}

impl Harness {
    fn new(threshold: u64) -> Self {
        let data_dir = tempfile::tempdir().expect("should create data dir");
        let gateway = Arc::new(MockClusterGateway::new());
        gateway.set_retain_deleted_jobs(true);

        let external = PipelineExternal::new(
            gateway.clone(),
            PipelineDefaults {
                data_path: data_dir.path().display().to_string(),
                ..Default::default()
            },
        );
        let resource = CtrlDrift::new(
            "regression-pipeline",
            CtrlDriftSpec {
                for_provider: CtrlDriftParameters {
                    deploy_namespace: NAMESPACE.to_string(),
                    drift_threshold: Some(threshold),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        Self {
            gateway,
            external,
            resource,
            data_dir,
        }
    }

    fn artifact(&self) -> std::path::PathBuf {
        self.data_dir.path().join("drift_data.csv")
    }

    fn write_samples(&self, lines: usize) {
        let mut file = std::fs::File::create(self.artifact()).expect("should create artifact");
        file.write_all("0.5,0.7\n".repeat(lines).as_bytes())
            .expect("should write artifact");
    }

    fn remove_artifact(&self) {
        if Path::new(&self.artifact()).exists() {
            std::fs::remove_file(self.artifact()).expect("should remove artifact");
        }
    }

    async fn pass(&self) -> PassReport {
        self.gateway.clear_calls();
        converge(&self.external, &self.resource)
            .await
            .expect("pass should succeed")
    }
}

fn create_job(name: &str) -> GatewayCall {
    GatewayCall::CreateJob {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
    }
}

fn delete_job(name: &str) -> GatewayCall {
    GatewayCall::DeleteJob {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
        propagation: Propagation::Background,
    }
}

fn create_deployment(name: &str) -> GatewayCall {
    GatewayCall::CreateDeployment {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
    }
}

fn delete_deployment(name: &str) -> GatewayCall {
    GatewayCall::DeleteDeployment {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
    }
}

#[test(tokio::test)]
async fn full_retraining_cycle() {
    let harness = Harness::new(3000);

    // provision
    let report = harness.pass().await;
    assert!(report.created);
    assert_eq!(
        harness.gateway.mutations(),
        vec![
            create_deployment("drift-deploy"),
            create_deployment("python-tflite-deploy"),
        ]
    );

    // no drift yet
    let report = harness.pass().await;
    assert_eq!(report.observation.evaluation.phase, PipelinePhase::Idle);
    assert!(harness.gateway.mutations().is_empty());

    // drift crosses the threshold
    harness.write_samples(3500);
    let report = harness.pass().await;
    assert_eq!(
        report.observation.evaluation.phase,
        PipelinePhase::LaunchingTraining
    );
    assert_eq!(harness.gateway.mutations(), vec![create_job("training-job")]);

    // training still running
    let report = harness.pass().await;
    assert_eq!(report.observation.evaluation.phase, PipelinePhase::Training);
    assert!(harness.gateway.mutations().is_empty());

    // training succeeds; the job consumed the artifact
    harness.gateway.complete_job(NAMESPACE, "training-job", 1, 0);
    harness.remove_artifact();
    let report = harness.pass().await;
    assert!(!report.observation.up_to_date);
    assert!(report.updated);
    assert_eq!(
        harness.gateway.mutations(),
        vec![
            delete_job("training-job"),
            create_job("converting-job"),
            delete_deployment("drift-deploy"),
            create_deployment("drift-deploy"),
            delete_deployment("python-tflite-deploy"),
            create_deployment("python-tflite-deploy"),
        ]
    );

    // training job still terminating, conversion running
    let report = harness.pass().await;
    assert_eq!(report.observation.evaluation.phase, PipelinePhase::Converting);
    assert!(report.observation.up_to_date);
    assert!(harness.gateway.mutations().is_empty());

    // conversion succeeds
    harness.gateway.finish_terminations();
    harness.gateway.complete_job(NAMESPACE, "converting-job", 1, 0);
    let report = harness.pass().await;
    assert!(report.updated);
    assert_eq!(
        harness.gateway.mutations(),
        vec![
            delete_job("converting-job"),
            delete_deployment("drift-deploy"),
            create_deployment("drift-deploy"),
            delete_deployment("python-tflite-deploy"),
            create_deployment("python-tflite-deploy"),
        ]
    );

    // re-observing the terminating conversion job changes nothing
    let report = harness.pass().await;
    assert!(!report.updated);
    assert!(harness.gateway.mutations().is_empty());

    harness.gateway.finish_terminations();
    let report = harness.pass().await;
    assert_eq!(report.observation.evaluation.phase, PipelinePhase::Idle);
    assert!(harness.gateway.mutations().is_empty());
}

#[test(tokio::test)]
async fn drift_at_threshold_never_trains() {
    let harness = Harness::new(3000);
    harness.pass().await;

    // 2999 lines plus the trailing segment
    harness.write_samples(2999);
    let report = harness.pass().await;

    assert_eq!(report.observation.evaluation.sample_count, Some(3000));
    assert_eq!(
        report.observation.evaluation.phase,
        PipelinePhase::DriftBelowThreshold
    );
    assert!(harness.gateway.mutations().is_empty());
}

#[test(tokio::test)]
async fn sustained_drift_launches_a_single_training_job() {
    let harness = Harness::new(10);
    harness.pass().await;
    harness
        .gateway
        .insert_job(NAMESPACE, JobSummary::new("nightly-backup"));
    harness.write_samples(50);

    for _ in 0..3 {
        harness.pass().await;
    }

    let summary = harness
        .gateway
        .job_summary(NAMESPACE, "training-job")
        .expect("training job should exist");
    assert_eq!(summary.succeeded, 0);
    let job = harness
        .gateway
        .job(NAMESPACE, "training-job")
        .expect("training job spec should be stored");
    assert_eq!(job.metadata.namespace.as_deref(), Some(NAMESPACE));
}

#[test(tokio::test)]
async fn failed_training_is_relaunched_on_a_later_pass() {
    let harness = Harness::new(10);
    harness.gateway.set_retain_deleted_jobs(false);
    harness.pass().await;
    harness.write_samples(50);
    harness.pass().await;

    harness.gateway.complete_job(NAMESPACE, "training-job", 0, 1);
    let report = harness.pass().await;
    assert_eq!(
        report.observation.evaluation.phase,
        PipelinePhase::TrainingFailed
    );
    assert_eq!(harness.gateway.mutations(), vec![delete_job("training-job")]);

    harness.pass().await;
    assert_eq!(harness.gateway.mutations(), vec![create_job("training-job")]);
}

#[test(tokio::test)]
async fn api_outage_degrades_to_no_action() {
    let harness = Harness::new(10);
    harness.pass().await;
    harness.write_samples(50);
    harness.gateway.set_list_error(Some(GatewayError::Timeout {
        operation: "list jobs".to_string(),
        seconds: 10,
    }));

    let report = harness.pass().await;

    assert!(!report.created);
    assert!(!report.updated);
    assert_eq!(report.observation.evaluation.phase, PipelinePhase::Unknown);
    assert!(harness.gateway.mutations().is_empty());
    assert!(!report.errors.is_empty());

    harness.gateway.set_list_error(None);
    harness.pass().await;
    assert_eq!(harness.gateway.mutations(), vec![create_job("training-job")]);
}
