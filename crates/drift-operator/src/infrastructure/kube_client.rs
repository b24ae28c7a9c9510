use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::infrastructure::k8s::KubernetesError;

/// Build the client shared by the controller and the cluster gateway.
///
/// With an explicit kubeconfig the given context (or its current one) is used,
/// otherwise the in-cluster config or `~/.kube/config`.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
) -> Result<Client, Report<KubernetesError>> {
    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };

    let config = match kubeconfig {
        Some(kubeconfig_path) => {
            tracing::info!(path = %kubeconfig_path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(&kubeconfig_path).change_context(
                KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?
        }
        None if options.context.is_some() => Config::from_kubeconfig(&options)
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to load the requested kubeconfig context".to_string(),
            })?,
        None => Config::infer()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to infer Kubernetes configuration".to_string(),
            })?,
    };

    tracing::debug!(cluster_url = %config.cluster_url, "kubernetes config resolved");

    Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}
