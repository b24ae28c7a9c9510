use core::error::Error;

/// Errors that can occur while setting up Kubernetes access.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
}

impl Error for KubernetesError {}

/// Errors returned to the controller runtime from a reconciliation.
#[derive(Debug, derive_more::Display)]
pub enum ReconcileError {
    #[display("invalid managed resource: {message}")]
    InvalidResource { message: String },
    #[display("failed to patch status of {name}: {message}")]
    StatusPatch { name: String, message: String },
    #[display("teardown incomplete: {message}")]
    Teardown { message: String },
    #[display("finalizer failed: {message}")]
    Finalizer { message: String },
}

impl Error for ReconcileError {}
