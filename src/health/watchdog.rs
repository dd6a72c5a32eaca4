use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cluster::{remove_node_with_uuid, ClusterApi};
use crate::models::HealthStatus;
use crate::store::Store;

/// Periodically evicts unhealthy nodes and requeues their resources
pub struct Watchdog {
    store: Arc<dyn Store>,
    cluster: Arc<dyn ClusterApi>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(store: Arc<dyn Store>, cluster: Arc<dyn ClusterApi>, interval: Duration) -> Self {
        Self {
            store,
            cluster,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Sweep every interval until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "Starting health watchdog");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
            self.sweep().await;
        }
        info!("Health watchdog stopped");
    }

    /// Evict all unhealthy nodes once, returns how many left the store
    pub async fn sweep(&self) -> usize {
        let nodes = match self.store.get_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("Watchdog could not list nodes: {}", e);
                return 0;
            }
        };

        let mut evicted = 0;
        for node in nodes.iter().filter(|n| n.status == HealthStatus::Unhealthy) {
            let outcome =
                remove_node_with_uuid(self.store.as_ref(), self.cluster.as_ref(), node.uuid).await;

            if let Some(e) = &outcome.error {
                error!(node = %node.uuid, "Failed to evict node: {}", e);
            }

            if !outcome.store_removed {
                continue;
            }

            evicted += 1;
            metrics::increment_counter!("apate_nodes_evicted_total");
            info!(node = %node.uuid, "Evicted unhealthy node");

            if let Some(resources) = &node.resources {
                if let Err(e) = self.store.add_resources_to_queue(vec![resources.clone()]).await {
                    error!(node = %node.uuid, "Failed to requeue resources: {}", e);
                }
            }
        }

        if evicted > 0 {
            metrics::gauge!("apate_nodes", (nodes.len() - evicted) as f64);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::cluster::MockClusterApi;
    use crate::error::{ClusterError, StoreError};
    use crate::models::{ConnectionInfo, Node, NodeResources};
    use crate::store::{ClusterStore, MockStore};

    fn node(status: HealthStatus, cpu: i32) -> Node {
        let mut node = Node::new(
            Uuid::new_v4(),
            ConnectionInfo::new("127.0.0.1", 7000),
            Some(NodeResources {
                id: Uuid::new_v4(),
                ram_bytes: 0,
                cpu_percent: cpu,
                max_pods: 0,
            }),
        );
        node.status = status;
        node
    }

    #[tokio::test]
    async fn test_evicts_unhealthy_and_requeues_resources() {
        let store = Arc::new(ClusterStore::new());
        let healthy = node(HealthStatus::Healthy, 500);
        let unhealthy = node(HealthStatus::Unhealthy, 1000);
        store.add_node(healthy.clone()).await.unwrap();
        store.add_node(unhealthy.clone()).await.unwrap();

        let expected_name = format!("apatelet-{}", unhealthy.uuid);
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_remove_node_from_cluster()
            .withf(move |name| *name == expected_name)
            .times(1)
            .returning(|_| Ok(()));

        let watchdog = Watchdog::new(store.clone(), Arc::new(cluster), Duration::from_secs(30));
        assert_eq!(watchdog.sweep().await, 1);

        let nodes = store.get_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].uuid, healthy.uuid);

        assert_eq!(store.queue_length().await.unwrap(), 1);
        let requeued = store.get_resource_from_queue().await.unwrap().unwrap();
        assert_eq!(requeued.cpu_percent, 1000);
        assert_eq!(Some(requeued), unhealthy.resources);
    }

    #[tokio::test]
    async fn test_cluster_failure_still_evicts_from_store() {
        let store = Arc::new(ClusterStore::new());
        store.add_node(node(HealthStatus::Unhealthy, 1000)).await.unwrap();

        let mut cluster = MockClusterApi::new();
        cluster
            .expect_remove_node_from_cluster()
            .returning(|_| Err(ClusterError::Manager("api down".to_string())));

        let watchdog = Watchdog::new(store.clone(), Arc::new(cluster), Duration::from_secs(30));
        assert_eq!(watchdog.sweep().await, 1);
        assert!(store.get_nodes().await.unwrap().is_empty());
        assert_eq!(store.queue_length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_requeue() {
        let first = node(HealthStatus::Unhealthy, 1000);
        let second = node(HealthStatus::Unhealthy, 2000);
        let nodes = vec![first, second.clone()];
        let failing = nodes[0].uuid;

        let mut store = MockStore::new();
        store.expect_get_nodes().returning(move || Ok(nodes.clone()));
        store.expect_remove_node().returning(move |uuid| {
            if uuid == failing {
                Err(StoreError::Unavailable("locked".to_string()))
            } else {
                Ok(())
            }
        });
        store
            .expect_add_resources_to_queue()
            .withf(|resources| resources.len() == 1 && resources[0].cpu_percent == 2000)
            .times(1)
            .returning(|_| Ok(()));

        let mut cluster = MockClusterApi::new();
        cluster
            .expect_remove_node_from_cluster()
            .times(2)
            .returning(|_| Ok(()));

        let watchdog = Watchdog::new(Arc::new(store), Arc::new(cluster), Duration::from_secs(30));
        assert_eq!(watchdog.sweep().await, 1);
    }

    #[tokio::test]
    async fn test_list_failure_skips_tick() {
        let mut store = MockStore::new();
        store
            .expect_get_nodes()
            .returning(|| Err(StoreError::Unavailable("gone".to_string())));
        let cluster = MockClusterApi::new();

        let watchdog = Watchdog::new(Arc::new(store), Arc::new(cluster), Duration::from_secs(30));
        assert_eq!(watchdog.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_promptly() {
        let store = Arc::new(ClusterStore::new());
        let watchdog = Watchdog::new(store, Arc::new(MockClusterApi::new()), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let handle = watchdog.spawn(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watchdog should stop within a tick")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_every_interval() {
        let store = Arc::new(ClusterStore::new());
        store.add_node(node(HealthStatus::Unhealthy, 1)).await.unwrap();

        let mut cluster = MockClusterApi::new();
        cluster.expect_remove_node_from_cluster().returning(|_| Ok(()));

        let cancel = CancellationToken::new();
        let handle = Watchdog::new(store.clone(), Arc::new(cluster), Duration::from_secs(30))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.get_nodes().await.unwrap().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
