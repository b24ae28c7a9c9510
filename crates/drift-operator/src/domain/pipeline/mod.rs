//! Retraining pipeline domain
//!
//! - [`settings`]: per-resource parameters resolved against operator defaults
//! - [`templates`]: the four workload objects
//! - [`drift_signal`]: reading the drift artifact
//! - [`evaluator`]: the pure state machine
//! - [`external`]: observe/create/update/delete over a [`ClusterGateway`]

pub mod drift_signal;
pub mod error;
pub mod evaluator;
pub mod external;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod observed;
pub mod settings;
pub mod status;
pub mod templates;
pub mod traits;

pub use error::GatewayError;
pub use error::GatewayResult;
pub use error::PipelineError;
pub use evaluator::ConvergenceAction;
pub use evaluator::Evaluation;
pub use evaluator::PipelinePhase;
pub use external::PipelineExternal;
pub use settings::ImageSet;
pub use settings::PipelineDefaults;
pub use settings::PipelineSettings;
pub use traits::ClusterGateway;
pub use traits::Propagation;
