//! Per-resource pipeline settings
//!
//! Every `CtrlDrift` declares optional overrides in `spec.forProvider`. They are
//! resolved against the operator-wide [`PipelineDefaults`] into a
//! [`PipelineSettings`] value that drives the workload templates and the drift
//! signal reader for one reconciliation pass.
//!
//! `data_path` and `volume_claim` only shape the workloads. The operator reads
//! the drift artifact from its own mount of the shared volume, so a resource
//! can pick the artifact's file name but never its directory.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use api_types::CtrlDriftParameters;
use serde::Deserialize;

use super::templates::WorkloadKind;

pub const MONITOR_DEPLOYMENT_NAME: &str = "drift-deploy";
pub const INFERENCE_DEPLOYMENT_NAME: &str = "python-tflite-deploy";
pub const TRAINING_JOB_NAME: &str = "training-job";
pub const CONVERSION_JOB_NAME: &str = "converting-job";

pub const DEFAULT_DRIFT_THRESHOLD: u64 = 3000;
pub const DEFAULT_DATA_PATH: &str = "/var/data/";
pub const DEFAULT_DRIFT_FILE: &str = "drift_data.csv";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_VOLUME_CLAIM: &str = "data-pvc";
pub const DEFAULT_BROKER_ADDRESS: &str = "lserf-tinyml.cloudmmwunibo.it";
pub const DEFAULT_TOPIC_NAME: &str = "drift-detection";

/// Container images for the four pipeline workloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSet {
    pub monitor: String,
    pub inference: String,
    pub training: String,
    pub conversion: String,
}

impl Default for ImageSet {
    fn default() -> Self {
        Self {
            monitor: "lucaserf/drift_detection:latest".to_string(),
            inference: "lucaserf/python_tflite:latest".to_string(),
            training: "lucaserf/training-regression:latest".to_string(),
            conversion: "lucaserf/converting-lite:latest".to_string(),
        }
    }
}

/// Operator-wide defaults applied when a resource leaves a parameter unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefaults {
    pub namespace: String,
    pub drift_threshold: u64,
    pub data_path: String,
    pub drift_file: String,
    pub volume_claim: String,
    pub broker_address: String,
    pub topic_name: String,
    pub images: ImageSet,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            data_path: DEFAULT_DATA_PATH.to_string(),
            drift_file: DEFAULT_DRIFT_FILE.to_string(),
            volume_claim: DEFAULT_VOLUME_CLAIM.to_string(),
            broker_address: DEFAULT_BROKER_ADDRESS.to_string(),
            topic_name: DEFAULT_TOPIC_NAME.to_string(),
            images: ImageSet::default(),
        }
    }
}

/// Fully resolved settings of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub namespace: String,
    pub monitor_name: String,
    pub drift_threshold: u64,
    /// Operator-side mount of the shared volume.
    pub artifact_dir: String,
    /// Workload-side mount of the shared volume.
    pub data_path: String,
    pub drift_file: String,
    pub volume_claim: String,
    pub broker_address: String,
    pub topic_name: String,
    pub training_script: Option<String>,
    pub images: ImageSet,
}

impl PipelineSettings {
    /// Resolve resource parameters against operator defaults.
    ///
    /// Empty strings count as unset.
    pub fn resolve(params: &CtrlDriftParameters, defaults: &PipelineDefaults) -> Self {
        let pick = |value: Option<&str>, default: &str| -> String {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let overrides = params.images.clone().unwrap_or_default();
        let images = ImageSet {
            monitor: pick(overrides.monitor.as_deref(), &defaults.images.monitor),
            inference: pick(overrides.inference.as_deref(), &defaults.images.inference),
            training: pick(overrides.training.as_deref(), &defaults.images.training),
            conversion: pick(overrides.conversion.as_deref(), &defaults.images.conversion),
        };

        Self {
            namespace: pick(Some(&params.deploy_namespace), &defaults.namespace),
            monitor_name: pick(Some(&params.deploy_name), MONITOR_DEPLOYMENT_NAME),
            drift_threshold: params.drift_threshold.unwrap_or(defaults.drift_threshold),
            artifact_dir: defaults.data_path.clone(),
            data_path: pick(params.data_path.as_deref(), &defaults.data_path),
            drift_file: pick(params.drift_file.as_deref(), &defaults.drift_file),
            volume_claim: pick(params.volume_claim.as_deref(), &defaults.volume_claim),
            broker_address: pick(params.broker_address.as_deref(), &defaults.broker_address),
            topic_name: pick(params.topic_name.as_deref(), &defaults.topic_name),
            training_script: Some(params.training_script.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            images,
        }
    }

    /// Location of the drift accumulation artifact on the operator's mount.
    pub fn drift_artifact_path(&self) -> PathBuf {
        Path::new(&self.artifact_dir).join(&self.drift_file)
    }

    /// Reject a `drift_file` that is not a plain file name.
    pub fn check_drift_file(&self) -> Result<(), String> {
        let name = self.drift_file.as_str();
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
            _ => Err(format!("drift_file {name:?} must be a plain file name")),
        }
    }

    /// Object name used for a workload kind.
    pub fn workload_name(&self, kind: WorkloadKind) -> &str {
        match kind {
            WorkloadKind::MonitorDeployment => &self.monitor_name,
            WorkloadKind::InferenceDeployment => INFERENCE_DEPLOYMENT_NAME,
            WorkloadKind::TrainingJob => TRAINING_JOB_NAME,
            WorkloadKind::ConversionJob => CONVERSION_JOB_NAME,
        }
    }
}
