use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{info, warn};

use super::{read_kube_config, ClusterApi, KubeCluster};
use crate::error::ClusterError;

/// Creates and destroys backing clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Create a cluster and write its kubeconfig to `kube_config_location`.
    /// Fails if a cluster with that name already exists.
    async fn create_cluster(
        &self,
        name: String,
        kube_config_location: String,
        manager_config_location: String,
    ) -> Result<(), ClusterError>;

    /// Delete a cluster, doing nothing if it does not exist
    async fn delete_cluster(&self, name: String) -> Result<(), ClusterError>;

    /// Kubeconfig context of the cluster with the given name
    fn cluster_context(&self, name: &str) -> String;
}

/// A cluster created by Apate, which Apate may therefore also delete
pub struct ManagedCluster {
    cluster: KubeCluster,
    manager: Arc<dyn ClusterManager>,
    name: String,
    context: String,
    kube_config: Vec<u8>,
}

impl ManagedCluster {
    /// Create a new cluster. With `force`, an existing cluster with the same
    /// name is deleted first. A half-created cluster is cleaned up on failure.
    pub async fn create(
        manager: Arc<dyn ClusterManager>,
        name: &str,
        kube_config_location: &str,
        manager_config_location: &str,
        force: bool,
    ) -> Result<Self, ClusterError> {
        if name.is_empty() {
            return Err(ClusterError::Manager(
                "trying to create a cluster with an empty name".to_string(),
            ));
        }

        if force {
            manager.delete_cluster(name.to_string()).await?;
        }

        if let Some(parent) = Path::new(kube_config_location).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ClusterError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        info!(name, "Creating managed cluster");
        let result = Self::connect(
            manager.clone(),
            name,
            kube_config_location,
            manager_config_location,
        )
        .await;

        if result.is_err() {
            if let Err(e) = manager.delete_cluster(name.to_string()).await {
                warn!(name, "Failed to clean up cluster after failed creation: {}", e);
            }
        }
        result
    }

    async fn connect(
        manager: Arc<dyn ClusterManager>,
        name: &str,
        kube_config_location: &str,
        manager_config_location: &str,
    ) -> Result<Self, ClusterError> {
        manager
            .create_cluster(
                name.to_string(),
                kube_config_location.to_string(),
                manager_config_location.to_string(),
            )
            .await?;

        let kube_config = read_kube_config(kube_config_location).await?;
        let context = manager.cluster_context(name);
        let cluster = KubeCluster::from_kube_config(&kube_config, &context).await?;

        Ok(Self {
            cluster,
            manager,
            name: name.to_string(),
            context,
            kube_config,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn kube_config(&self) -> &[u8] {
        &self.kube_config
    }

    /// Destroy the cluster
    pub async fn delete(&self) -> Result<(), ClusterError> {
        info!(name = %self.name, "Deleting managed cluster");
        self.manager.delete_cluster(self.name.clone()).await
    }
}

#[async_trait]
impl ClusterApi for ManagedCluster {
    async fn remove_node_from_cluster(&self, name: String) -> Result<(), ClusterError> {
        self.cluster.remove_node_from_cluster(name).await
    }

    async fn remove_nodes_from_cluster(&self, names: Vec<String>) -> Result<(), ClusterError> {
        self.cluster.remove_nodes_from_cluster(names).await
    }

    async fn number_of_nodes(&self) -> Result<usize, ClusterError> {
        self.cluster.number_of_nodes().await
    }
}
