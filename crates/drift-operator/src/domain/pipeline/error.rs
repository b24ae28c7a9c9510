use core::error::Error;

use error_stack::Report;

/// Errors raised by a [`ClusterGateway`](super::traits::ClusterGateway).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum GatewayError {
    #[display("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        name: String,
        namespace: String,
    },
    #[display("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },
    #[display("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
    #[display("failed to reach the Kubernetes API: {message}")]
    Connection { message: String },
    #[display("{operation} failed: {message}")]
    Api { operation: String, message: String },
}

impl Error for GatewayError {}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type GatewayResult<T> = Result<T, Report<GatewayError>>;

/// Errors that abort a whole reconciliation operation.
#[derive(Debug, derive_more::Display)]
pub enum PipelineError {
    #[display("invalid managed resource: {message}")]
    InvalidResource { message: String },
}

impl Error for PipelineError {}
