use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;

use crate::domain::pipeline::settings::DEFAULT_BROKER_ADDRESS;
use crate::domain::pipeline::settings::DEFAULT_DATA_PATH;
use crate::domain::pipeline::settings::DEFAULT_DRIFT_FILE;
use crate::domain::pipeline::settings::DEFAULT_DRIFT_THRESHOLD;
use crate::domain::pipeline::settings::DEFAULT_NAMESPACE;
use crate::domain::pipeline::settings::DEFAULT_TOPIC_NAME;
use crate::domain::pipeline::settings::DEFAULT_VOLUME_CLAIM;
use crate::domain::pipeline::ImageSet;
use crate::domain::pipeline::PipelineDefaults;

#[derive(Parser, Debug, Clone)]
pub struct OperatorArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (in-cluster config or ~/.kube/config when unset)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "KUBE_CONTEXT", help = "Kubeconfig context to use")]
    pub kube_context: Option<String>,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_POLL_INTERVAL_SECS",
        default_value_t = 60,
        help = "Seconds between reconciliation passes of a resource"
    )]
    pub poll_interval_secs: u64,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_ERROR_REQUEUE_SECS",
        default_value_t = 30,
        help = "Seconds before retrying a failed reconciliation"
    )]
    pub error_requeue_secs: u64,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_GATEWAY_TIMEOUT_SECS",
        default_value_t = 10,
        help = "Timeout of a single Kubernetes API call"
    )]
    pub gateway_timeout_secs: u64,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_DRIFT_THRESHOLD",
        default_value_t = DEFAULT_DRIFT_THRESHOLD,
        help = "Drift sample count above which retraining starts"
    )]
    pub drift_threshold: u64,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_DATA_PATH",
        default_value = DEFAULT_DATA_PATH,
        help = "Mount path of the shared data volume"
    )]
    pub data_path: String,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_DRIFT_FILE",
        default_value = DEFAULT_DRIFT_FILE,
        help = "File name of the drift artifact inside the data path"
    )]
    pub drift_file: String,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_NAMESPACE",
        default_value = DEFAULT_NAMESPACE,
        help = "Namespace for workloads of resources that do not set deploy_namespace"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_VOLUME_CLAIM",
        default_value = DEFAULT_VOLUME_CLAIM,
        help = "PersistentVolumeClaim backing the shared data volume"
    )]
    pub volume_claim: String,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_BROKER_ADDRESS",
        default_value = DEFAULT_BROKER_ADDRESS
    )]
    pub broker_address: String,

    #[arg(long, env = "DRIFT_OPERATOR_TOPIC_NAME", default_value = DEFAULT_TOPIC_NAME)]
    pub topic_name: String,

    #[arg(
        long,
        env = "DRIFT_OPERATOR_IMAGES",
        help = "Workload image overrides as JSON, e.g. {\"training\":\"registry/train:v2\"}"
    )]
    pub images: Option<String>,
}

impl OperatorArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Operator-wide defaults for pipeline parameters.
    pub fn pipeline_defaults(&self) -> Result<PipelineDefaults> {
        let images = match self.images.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<ImageSet>(raw)
                .context("failed to parse DRIFT_OPERATOR_IMAGES")?,
            _ => ImageSet::default(),
        };

        Ok(PipelineDefaults {
            namespace: self.namespace.clone(),
            drift_threshold: self.drift_threshold,
            data_path: self.data_path.clone(),
            drift_file: self.drift_file.clone(),
            volume_claim: self.volume_claim.clone(),
            broker_address: self.broker_address.clone(),
            topic_name: self.topic_name.clone(),
            images,
        })
    }
}
