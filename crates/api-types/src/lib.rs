//! Shared API type definitions
//!
//! This crate contains the `CtrlDrift` custom resource used by the drift operator:
//! the desired state declared by the user (`spec.forProvider`) and the observed
//! state written back by the operator (`status`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// API group of the custom resource.
pub const API_GROUP: &str = "mlops.driftprovider.io";

/// Condition type reporting whether the pipeline workloads are available.
pub const CONDITION_READY: &str = "Ready";

/// Condition type reporting whether the last reconciliation pass succeeded.
pub const CONDITION_SYNCED: &str = "Synced";

/// Desired state of a drift-triggered retraining pipeline.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "mlops.driftprovider.io",
    version = "v1alpha1",
    kind = "CtrlDrift",
    plural = "ctrldrifts",
    status = "CtrlDriftStatus",
    category = "driftprovider",
    printcolumn = r#"{"name":"READY","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"SYNCED","type":"string","jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"PHASE","type":"string","jsonPath":".status.atProvider.phase"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct CtrlDriftSpec {
    pub for_provider: CtrlDriftParameters,

    /// What happens to the pipeline workloads when this resource is deleted.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Configurable fields of a `CtrlDrift`.
///
/// Keys use snake_case on the wire to stay compatible with existing manifests.
/// Every optional field falls back to the operator-wide default.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct CtrlDriftParameters {
    /// Name of the drift monitoring deployment.
    #[serde(default)]
    pub deploy_name: String,

    /// Namespace all pipeline workloads are created in.
    #[serde(default)]
    pub deploy_namespace: String,

    /// Training script location, forwarded to the training job when set.
    #[serde(default)]
    pub training_script: String,

    /// Number of drift samples above which retraining starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_threshold: Option<u64>,

    /// Mount path of the shared data volume inside the pipeline workloads.
    /// The operator always reads the drift artifact from its own mount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,

    /// File name of the drift accumulation artifact at the root of the shared
    /// volume. Must be a plain file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_file: Option<String>,

    /// PersistentVolumeClaim mounted by the pipeline workloads. It should be
    /// the claim the operator itself mounts, or drift is never observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<WorkloadImages>,
}

/// Container image overrides, one per workload.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<String>,
}

/// Deletion behaviour for the workloads owned by a `CtrlDrift`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Tear down deployments and jobs.
    #[default]
    Delete,
    /// Leave workloads running in the cluster.
    Orphan,
}

/// Observed state of a `CtrlDrift`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CtrlDriftStatus {
    #[serde(default)]
    pub at_provider: CtrlDriftObservation,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Error of the latest reconciliation pass. Serialized as `null` when the
    /// pass was clean so a merge patch clears it.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl CtrlDriftStatus {
    /// Look up a condition by type.
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Observable fields of a `CtrlDrift`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CtrlDriftObservation {
    /// Drift signal classification: `Absent`, `BelowThreshold`, `AboveThreshold` or `Unknown`.
    #[serde(default)]
    pub drift: String,

    /// Pipeline phase inferred during the last pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC 3339 timestamp of the last status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}
