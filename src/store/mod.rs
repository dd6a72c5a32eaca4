//! Cluster store
//!
//! The single source of truth for fleet membership, the pending resource
//! queue, the active execution plan and the kubeconfig handed to joining
//! apatelets. All state sits behind one reader/writer lock; no method calls
//! another store method while holding it.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ExecutionPlan, HealthStatus, Node, NodeResources};

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Add a node, failing if its uuid is already present
    async fn add_node(&self, node: Node) -> StoreResult<()>;

    /// Remove a node, absent uuids are ignored
    async fn remove_node(&self, uuid: Uuid) -> StoreResult<()>;

    async fn remove_nodes(&self, uuids: Vec<Uuid>) -> StoreResult<()>;

    async fn get_node(&self, uuid: Uuid) -> StoreResult<Node>;

    /// Snapshot of all nodes
    async fn get_nodes(&self) -> StoreResult<Vec<Node>>;

    async fn clear_nodes(&self) -> StoreResult<()>;

    async fn set_node_status(&self, uuid: Uuid, status: HealthStatus) -> StoreResult<()>;

    async fn add_resources_to_queue(&self, resources: Vec<NodeResources>) -> StoreResult<()>;

    /// Pop the oldest queued resource, if any
    async fn get_resource_from_queue(&self) -> StoreResult<Option<NodeResources>>;

    /// Put a popped resource back at the head of the queue
    async fn requeue_resource(&self, resources: NodeResources) -> StoreResult<()>;

    async fn queue_length(&self) -> StoreResult<usize>;

    /// Drop queued resources with the given ids
    async fn discard_resources(&self, ids: Vec<Uuid>) -> StoreResult<()>;

    async fn set_kube_config(&self, config: Vec<u8>) -> StoreResult<()>;

    async fn get_kube_config(&self) -> StoreResult<Vec<u8>>;

    async fn set_execution_plan(&self, plan: Option<ExecutionPlan>) -> StoreResult<()>;

    /// The active plan, [`StoreError::NoScenario`] if none was loaded
    async fn get_execution_plan(&self) -> StoreResult<ExecutionPlan>;
}

#[derive(Debug, Default)]
struct StoreInner {
    nodes: HashMap<Uuid, Node>,
    queue: VecDeque<NodeResources>,
    plan: Option<ExecutionPlan>,
    kube_config: Vec<u8>,
}

/// In-memory [`Store`]
#[derive(Debug, Default)]
pub struct ClusterStore {
    inner: RwLock<StoreInner>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for ClusterStore {
    async fn add_node(&self, node: Node) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.nodes.contains_key(&node.uuid) {
            return Err(StoreError::DuplicateNode(node.uuid));
        }
        inner.nodes.insert(node.uuid, node);
        Ok(())
    }

    async fn remove_node(&self, uuid: Uuid) -> StoreResult<()> {
        self.inner.write().await.nodes.remove(&uuid);
        Ok(())
    }

    async fn remove_nodes(&self, uuids: Vec<Uuid>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for uuid in uuids {
            inner.nodes.remove(&uuid);
        }
        Ok(())
    }

    async fn get_node(&self, uuid: Uuid) -> StoreResult<Node> {
        self.inner
            .read()
            .await
            .nodes
            .get(&uuid)
            .cloned()
            .ok_or(StoreError::NodeNotFound(uuid))
    }

    async fn get_nodes(&self) -> StoreResult<Vec<Node>> {
        Ok(self.inner.read().await.nodes.values().cloned().collect())
    }

    async fn clear_nodes(&self) -> StoreResult<()> {
        self.inner.write().await.nodes.clear();
        Ok(())
    }

    async fn set_node_status(&self, uuid: Uuid, status: HealthStatus) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let node = inner
            .nodes
            .get_mut(&uuid)
            .ok_or(StoreError::NodeNotFound(uuid))?;
        node.status = status;
        Ok(())
    }

    async fn add_resources_to_queue(&self, resources: Vec<NodeResources>) -> StoreResult<()> {
        self.inner.write().await.queue.extend(resources);
        Ok(())
    }

    async fn get_resource_from_queue(&self) -> StoreResult<Option<NodeResources>> {
        Ok(self.inner.write().await.queue.pop_front())
    }

    async fn requeue_resource(&self, resources: NodeResources) -> StoreResult<()> {
        self.inner.write().await.queue.push_front(resources);
        Ok(())
    }

    async fn queue_length(&self) -> StoreResult<usize> {
        Ok(self.inner.read().await.queue.len())
    }

    async fn discard_resources(&self, ids: Vec<Uuid>) -> StoreResult<()> {
        let ids: HashSet<Uuid> = ids.into_iter().collect();
        self.inner.write().await.queue.retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    async fn set_kube_config(&self, config: Vec<u8>) -> StoreResult<()> {
        self.inner.write().await.kube_config = config;
        Ok(())
    }

    async fn get_kube_config(&self) -> StoreResult<Vec<u8>> {
        Ok(self.inner.read().await.kube_config.clone())
    }

    async fn set_execution_plan(&self, plan: Option<ExecutionPlan>) -> StoreResult<()> {
        self.inner.write().await.plan = plan;
        Ok(())
    }

    async fn get_execution_plan(&self) -> StoreResult<ExecutionPlan> {
        self.inner
            .read()
            .await
            .plan
            .clone()
            .ok_or(StoreError::NoScenario)
    }
}
