use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node as KubeNode;
use kube::{
    api::{Api, DeleteParams, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::{info, instrument, warn};

use super::ClusterApi;
use crate::error::ClusterError;

/// Handle on a real Kubernetes cluster
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using kubeconfig bytes and a context name
    #[instrument(skip(kube_config))]
    pub async fn from_kube_config(kube_config: &[u8], context: &str) -> Result<Self, ClusterError> {
        let yaml = std::str::from_utf8(kube_config)
            .map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;
        let kubeconfig =
            Kubeconfig::from_yaml(yaml).map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;

        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;
        let client = Client::try_from(config)?;

        info!(context, "Created Kubernetes client");
        Ok(Self { client })
    }

    fn nodes(&self) -> Api<KubeNode> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    #[instrument(skip(self))]
    async fn remove_node_from_cluster(&self, name: String) -> Result<(), ClusterError> {
        match self.nodes().delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted node from cluster");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!("Node not present in cluster");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_nodes_from_cluster(&self, names: Vec<String>) -> Result<(), ClusterError> {
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.remove_node_from_cluster(name).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    #[instrument(skip(self))]
    async fn number_of_nodes(&self) -> Result<usize, ClusterError> {
        let list = self.nodes().list(&ListParams::default()).await?;
        Ok(list.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
  name: kind-apate
contexts:
- context:
    cluster: kind-apate
    user: kind-apate
  name: kind-apate
current-context: kind-apate
users:
- name: kind-apate
  user:
    token: abc
"#;

    #[tokio::test]
    async fn test_client_from_kube_config() {
        KubeCluster::from_kube_config(KUBECONFIG.as_bytes(), "kind-apate")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_context_is_rejected() {
        let err = KubeCluster::from_kube_config(KUBECONFIG.as_bytes(), "missing")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClusterError::Kubeconfig(_)));
    }

    #[tokio::test]
    async fn test_garbage_kube_config() {
        let err = KubeCluster::from_kube_config(b"\xff\xfe", "kind-apate")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClusterError::Kubeconfig(_)));
    }
}
