//! Workload templates
//!
//! Pure constructors for the four workloads of a retraining pipeline. Every
//! workload mounts the shared data volume at the configured data path so the
//! monitor, the training job and the conversion job exchange artifacts through
//! the same claim.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::settings::PipelineSettings;

pub const DATA_VOLUME_NAME: &str = "data-volume";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "drift-operator";

const MONITOR_APP_LABEL: &str = "drift-detection";
const INFERENCE_APP_LABEL: &str = "python-tflite";
const TRAINING_APP_LABEL: &str = "training-regression";
const CONVERSION_APP_LABEL: &str = "converting-lite";

/// The four workload kinds a pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum WorkloadKind {
    #[display("monitor deployment")]
    MonitorDeployment,
    #[display("inference deployment")]
    InferenceDeployment,
    #[display("training job")]
    TrainingJob,
    #[display("conversion job")]
    ConversionJob,
}

impl WorkloadKind {
    pub fn is_job(self) -> bool {
        matches!(self, Self::TrainingJob | Self::ConversionJob)
    }

    fn app_label(self) -> &'static str {
        match self {
            Self::MonitorDeployment => MONITOR_APP_LABEL,
            Self::InferenceDeployment => INFERENCE_APP_LABEL,
            Self::TrainingJob => TRAINING_APP_LABEL,
            Self::ConversionJob => CONVERSION_APP_LABEL,
        }
    }
}

/// A rendered workload, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadSpec {
    MonitorDeployment(Deployment),
    InferenceDeployment(Deployment),
    TrainingJob(Job),
    ConversionJob(Job),
}

impl WorkloadSpec {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Self::MonitorDeployment(_) => WorkloadKind::MonitorDeployment,
            Self::InferenceDeployment(_) => WorkloadKind::InferenceDeployment,
            Self::TrainingJob(_) => WorkloadKind::TrainingJob,
            Self::ConversionJob(_) => WorkloadKind::ConversionJob,
        }
    }
}

/// Render the workload of `kind` for `settings`.
pub fn build(kind: WorkloadKind, settings: &PipelineSettings) -> WorkloadSpec {
    match kind {
        WorkloadKind::MonitorDeployment => {
            WorkloadSpec::MonitorDeployment(monitor_deployment(settings))
        }
        WorkloadKind::InferenceDeployment => {
            WorkloadSpec::InferenceDeployment(inference_deployment(settings))
        }
        WorkloadKind::TrainingJob => WorkloadSpec::TrainingJob(training_job(settings)),
        WorkloadKind::ConversionJob => WorkloadSpec::ConversionJob(conversion_job(settings)),
    }
}

/// Drift monitor: consumes the broker topic and appends drifted samples to the
/// drift artifact.
pub fn monitor_deployment(settings: &PipelineSettings) -> Deployment {
    let env = vec![
        env("FOLDER_PATH", &settings.data_path),
        env("BROKER_ADDRESS", &settings.broker_address),
        env("TOPIC_NAME", &settings.topic_name),
        env("BATCH_SIZE", "100"),
        env("ALPHA_P_VALUE", "0.001"),
        env("OUTPUT_NAME", drift_output_name(&settings.drift_file)),
    ];
    let container = container(
        WorkloadKind::MonitorDeployment,
        &settings.images.monitor,
        env,
        settings,
        true,
    );
    deployment(WorkloadKind::MonitorDeployment, settings, container)
}

/// Inference server: serves the converted model.
pub fn inference_deployment(settings: &PipelineSettings) -> Deployment {
    let env = vec![
        env("MODEL_NAME", "model_regression.tflite"),
        env("DATA_FOLDER", &settings.data_path),
        env("BATCH_SIZE", "10"),
        env("TOPIC_NAME", &settings.topic_name),
        env("BROKER_ADDRESS", &settings.broker_address),
    ];
    let container = container(
        WorkloadKind::InferenceDeployment,
        &settings.images.inference,
        env,
        settings,
        true,
    );
    deployment(WorkloadKind::InferenceDeployment, settings, container)
}

/// Training job: retrains on the accumulated drift samples.
pub fn training_job(settings: &PipelineSettings) -> Job {
    let mut env = vec![
        env("FOLDER_PATH", &settings.data_path),
        env("OUTPUT_PATH", "regression_model_tf"),
        env("DATA_PATH", &settings.drift_file),
        env("LOGGING_LEVEL", "INFO"),
        env("RENAME", "reference.csv"),
    ];
    if let Some(script) = &settings.training_script {
        env.push(self::env("TRAINING_SCRIPT", script));
    }
    let container = container(
        WorkloadKind::TrainingJob,
        &settings.images.training,
        env,
        settings,
        false,
    );
    job(WorkloadKind::TrainingJob, settings, container)
}

/// Conversion job: converts the trained model into the serving format.
pub fn conversion_job(settings: &PipelineSettings) -> Job {
    let env = vec![
        env("FOLDER_PATH", &settings.data_path),
        env("MODEL_PATH", "regression_model_tf.keras"),
        env("OUTPUT_PATH", "model_regression"),
    ];
    let container = container(
        WorkloadKind::ConversionJob,
        &settings.images.conversion,
        env,
        settings,
        true,
    );
    job(WorkloadKind::ConversionJob, settings, container)
}

/// The monitor takes the artifact name without its extension.
fn drift_output_name(drift_file: &str) -> &str {
    drift_file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(drift_file)
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn app_labels(kind: WorkloadKind) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), kind.app_label().to_string())])
}

fn metadata(kind: WorkloadKind, settings: &PipelineSettings) -> ObjectMeta {
    let mut labels = app_labels(kind);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    ObjectMeta {
        name: Some(settings.workload_name(kind).to_string()),
        namespace: Some(settings.namespace.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

fn container(
    kind: WorkloadKind,
    image: &str,
    env: Vec<EnvVar>,
    settings: &PipelineSettings,
    pull_always: bool,
) -> Container {
    Container {
        name: kind.app_label().to_string(),
        image: Some(image.to_string()),
        image_pull_policy: pull_always.then(|| "Always".to_string()),
        env: Some(env),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: settings.data_path.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn data_volume(settings: &PipelineSettings) -> Volume {
    Volume {
        name: DATA_VOLUME_NAME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: settings.volume_claim.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn deployment(kind: WorkloadKind, settings: &PipelineSettings, container: Container) -> Deployment {
    Deployment {
        metadata: metadata(kind, settings),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(app_labels(kind)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(kind)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![data_volume(settings)]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn job(kind: WorkloadKind, settings: &PipelineSettings, container: Container) -> Job {
    Job {
        metadata: metadata(kind, settings),
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            completions: Some(1),
            parallelism: Some(1),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(kind)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Never".to_string()),
                    volumes: Some(vec![data_volume(settings)]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
