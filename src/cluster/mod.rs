//! The backing Kubernetes cluster apatelets register with

pub mod kind;
pub mod kubernetes;
pub mod managed;

use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::error::ClusterError;
use crate::models::kubernetes_node_name;
use crate::store::Store;

pub use kubernetes::KubeCluster;
pub use kind::KindManager;
pub use managed::{ClusterManager, ManagedCluster};

/// Operations the control plane performs on the backing cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Delete a node object, a missing node is not an error
    async fn remove_node_from_cluster(&self, name: String) -> Result<(), ClusterError>;

    async fn remove_nodes_from_cluster(&self, names: Vec<String>) -> Result<(), ClusterError>;

    async fn number_of_nodes(&self) -> Result<usize, ClusterError>;
}

/// Stand-in used when no backing cluster could be reached at startup
#[derive(Debug, Clone, Default)]
pub struct DetachedCluster;

#[async_trait]
impl ClusterApi for DetachedCluster {
    async fn remove_node_from_cluster(&self, name: String) -> Result<(), ClusterError> {
        Err(ClusterError::Kubeconfig(format!(
            "no backing cluster connected, cannot remove {}",
            name
        )))
    }

    async fn remove_nodes_from_cluster(&self, names: Vec<String>) -> Result<(), ClusterError> {
        Err(ClusterError::Kubeconfig(format!(
            "no backing cluster connected, cannot remove {} nodes",
            names.len()
        )))
    }

    async fn number_of_nodes(&self) -> Result<usize, ClusterError> {
        Ok(0)
    }
}

/// Result of removing a node from both the Apate store and the backing cluster
#[derive(Debug)]
pub struct RemovalOutcome {
    pub store_removed: bool,
    pub cluster_removed: bool,
    /// Both failures combined, if any
    pub error: Option<ClusterError>,
}

/// Remove a node from the store and from the backing cluster. The second
/// removal is attempted even if the first one failed.
pub async fn remove_node_with_uuid(
    store: &dyn Store,
    cluster: &dyn ClusterApi,
    uuid: Uuid,
) -> RemovalOutcome {
    let store_error = store.remove_node(uuid).await.err().map(|e| e.to_string());
    let cluster_error = cluster
        .remove_node_from_cluster(kubernetes_node_name(&uuid))
        .await
        .err()
        .map(|e| e.to_string());

    let error = if store_error.is_some() || cluster_error.is_some() {
        Some(ClusterError::Removal {
            node: uuid,
            store: store_error.clone(),
            cluster: cluster_error.clone(),
        })
    } else {
        None
    };

    RemovalOutcome {
        store_removed: store_error.is_none(),
        cluster_removed: cluster_error.is_none(),
        error,
    }
}

/// Read a kubeconfig file
pub async fn read_kube_config(path: impl AsRef<Path>) -> Result<Vec<u8>, ClusterError> {
    let path = path.as_ref();
    tokio::fs::read(path).await.map_err(|source| ClusterError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write a kubeconfig file, creating parent directories
pub async fn write_kube_config(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), ClusterError> {
    let path = path.as_ref();
    let io_error = |source| ClusterError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(path, bytes).await.map_err(io_error)
}
