use std::sync::Arc;

use crate::infrastructure::k8s::ControllerContext;
use crate::infrastructure::k8s::KubeGateway;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub controller: Arc<ControllerContext<KubeGateway>>,
}
