use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::info;
use tracing::warn;

use crate::infrastructure::k8s::KubernetesError;

/// Builds a client from `kubeconfig`, falling back to the in-cluster service
/// account and then to the default inference chain when the file cannot be
/// used. Without a path only the inference chain applies.
///
/// # Errors
///
/// - [`KubernetesError::ConnectionFailed`] if no usable configuration is found
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<KubernetesError>> {
    let config = match kubeconfig {
        Some(kubeconfig_path) => match load_kubeconfig(&kubeconfig_path).await {
            Ok(config) => {
                info!(path = %kubeconfig_path.display(), "Using kubeconfig");
                config
            }
            Err(e) => {
                warn!("Falling back to in-cluster configuration: {e:?}");
                match Config::incluster() {
                    Ok(config) => config,
                    Err(incluster) => {
                        warn!("No in-cluster configuration, inferring: {incluster}");
                        infer_config().await?
                    }
                }
            }
        },
        None => infer_config().await?,
    };

    Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}

async fn infer_config() -> Result<Config, Report<KubernetesError>> {
    Config::infer()
        .await
        .change_context(KubernetesError::ConnectionFailed {
            message: "Failed to infer Kubernetes configuration".to_string(),
        })
}

/// Loads a client configuration from the kubeconfig file at `path`.
///
/// # Errors
///
/// - [`KubernetesError::ConnectionFailed`] if the file is unreadable or has no usable context
pub async fn load_kubeconfig(path: &Path) -> Result<Config, Report<KubernetesError>> {
    let kubeconfig =
        Kubeconfig::read_from(path).change_context(KubernetesError::ConnectionFailed {
            message: format!("Failed to read kubeconfig file: {}", path.display()),
        })?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(KubernetesError::ConnectionFailed {
            message: format!(
                "Failed to create config from kubeconfig: {}",
                path.display()
            ),
        })
}
