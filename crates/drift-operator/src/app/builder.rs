use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::OperatorArgs;
use crate::domain::pipeline::PipelineExternal;
use crate::infrastructure::k8s::ControllerContext;
use crate::infrastructure::k8s::KubeGateway;
use crate::infrastructure::kube_client::init_kube_client;

/// Application builder
pub struct ApplicationBuilder {
    operator_args: OperatorArgs,
}

impl ApplicationBuilder {
    pub fn new(operator_args: OperatorArgs) -> Self {
        Self { operator_args }
    }

    /// Build complete application
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let defaults = self.operator_args.pipeline_defaults()?;
        tracing::info!(
            namespace = %defaults.namespace,
            drift_threshold = defaults.drift_threshold,
            data_path = %defaults.data_path,
            drift_file = %defaults.drift_file,
            "pipeline defaults"
        );

        let client = init_kube_client(
            self.operator_args.kubeconfig.clone(),
            self.operator_args.kube_context.clone(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let gateway = Arc::new(KubeGateway::new(
            client.clone(),
            self.operator_args.gateway_timeout(),
        ));
        let controller = Arc::new(ControllerContext {
            client,
            external: PipelineExternal::new(gateway, defaults),
            poll_interval: self.operator_args.poll_interval(),
            error_requeue: self.operator_args.error_requeue(),
        });

        Ok(Application::new(
            ApplicationServices { controller },
            self.operator_args,
        ))
    }
}
