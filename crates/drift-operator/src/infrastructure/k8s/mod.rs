//! Kubernetes integration module.
//!
//! - [`KubeGateway`]: lists, creates and deletes pipeline workloads through `kube::Api`
//! - [`controller`]: drives `CtrlDrift` reconciliation with `kube::runtime::Controller`

pub mod controller;
pub mod gateway;
pub mod types;

pub use controller::ControllerContext;
pub use gateway::KubeGateway;
pub use types::KubernetesError;
pub use types::ReconcileError;
