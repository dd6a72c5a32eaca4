//! Orchestration service
//!
//! Composes the store, the scenario normalizer, the runner registry, the
//! backing cluster and the scenario dispatcher behind the join, leave, load
//! and start operations exposed by the API.

pub mod dispatch;

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::{remove_node_with_uuid, ClusterApi};
use crate::config::ControlPlaneConfig;
use crate::error::{AppError, AppResult, DispatchError};
use crate::models::{
    ClusterStatus, ConnectionInfo, HealthStatus, JoinInformation, JoinRequest, Node, PublicScenario,
};
use crate::runner::RunnerRegistry;
use crate::scenario;
use crate::store::Store;

pub use dispatch::{HttpDispatcher, ScenarioDispatcher, START_SCENARIO_PATH};

pub struct Orchestrator {
    store: Arc<dyn Store>,
    runners: Arc<RunnerRegistry>,
    cluster: Arc<dyn ClusterApi>,
    dispatcher: Arc<dyn ScenarioDispatcher>,
    config: Arc<ControlPlaneConfig>,
    /// Parent token of every apatelet spawned by a scenario load
    apatelets: CancellationToken,
    load_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        runners: Arc<RunnerRegistry>,
        cluster: Arc<dyn ClusterApi>,
        dispatcher: Arc<dyn ScenarioDispatcher>,
        config: Arc<ControlPlaneConfig>,
    ) -> Self {
        Self {
            store,
            runners,
            cluster,
            dispatcher,
            config,
            apatelets: CancellationToken::new(),
            load_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    /// Register the apatelet at `peer` as a new node.
    ///
    /// The address always comes from the connection, the port may be
    /// declared by the apatelet. The oldest queued resources are assigned to
    /// the node.
    pub async fn join_cluster(&self, peer: SocketAddr, request: JoinRequest) -> AppResult<JoinInformation> {
        let uuid = Uuid::new_v4();
        let port = request.listen_port.unwrap_or_else(|| peer.port());
        let connection_info = ConnectionInfo::new(peer.ip().to_string(), port);

        let resources = self.store.get_resource_from_queue().await?;
        if resources.is_none() {
            warn!(node = %uuid, "No queued resources left for joining node");
        }

        let node = Node::new(uuid, connection_info.clone(), resources.clone());
        if let Err(e) = self.store.add_node(node).await {
            if let Some(resources) = resources {
                self.store.requeue_resource(resources).await?;
            }
            return Err(e.into());
        }

        let kube_config = self.store.get_kube_config().await?;

        metrics::increment_counter!("apate_nodes_joined_total");
        self.record_node_count().await;
        info!(node = %uuid, address = %connection_info, "Node joined the cluster");

        Ok(JoinInformation {
            kube_config,
            kube_context: self.config.kube_context.clone(),
            node_uuid: uuid.to_string(),
            resources,
        })
    }

    /// Remove a node from the store and, best effort, from the backing cluster
    pub async fn leave_cluster(&self, node_uuid: &str) -> AppResult<()> {
        let uuid = Uuid::parse_str(node_uuid)
            .map_err(|_| AppError::BadRequest(format!("invalid node uuid '{}'", node_uuid)))?;

        let outcome = remove_node_with_uuid(self.store.as_ref(), self.cluster.as_ref(), uuid).await;
        if !outcome.store_removed {
            let message = outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("failed to remove node {}", uuid));
            return Err(AppError::Internal(message));
        }
        if let Some(e) = outcome.error {
            warn!(node = %uuid, "Node left but could not be removed from the cluster: {}", e);
        }

        self.record_node_count().await;
        info!(node = %uuid, "Node left the cluster");
        Ok(())
    }

    /// Normalize a scenario, queue its resources, store its plan and spawn
    /// one apatelet per resource. Nothing is kept if any step fails.
    pub async fn load_scenario(&self, scenario: PublicScenario) -> AppResult<usize> {
        let _loading = self.load_lock.lock().await;

        let normalized = scenario::normalize(&scenario)?;
        let amount = normalized.resources.len();
        let ids: Vec<Uuid> = normalized.resources.iter().map(|r| r.id).collect();
        let previous = self.store.get_execution_plan().await.ok();

        self.store.add_resources_to_queue(normalized.resources).await?;

        if let Err(e) = self.store.set_execution_plan(Some(normalized.plan)).await {
            self.rollback(ids, previous).await;
            return Err(e.into());
        }

        if amount > 0 {
            let spawned = self
                .runners
                .run(
                    &self.config.apatelet_run_type,
                    self.apatelets.child_token(),
                    amount,
                    self.config.apatelet_environment(),
                )
                .await;

            if let Err(e) = spawned {
                self.rollback(ids, previous).await;
                return Err(e.into());
            }
        }

        metrics::increment_counter!("apate_scenarios_loaded_total");
        info!(nodes = amount, tasks = scenario.tasks.len(), "Scenario loaded");
        Ok(amount)
    }

    async fn rollback(&self, ids: Vec<Uuid>, previous: Option<crate::models::ExecutionPlan>) {
        if let Err(e) = self.store.discard_resources(ids).await {
            warn!("Failed to discard resources of a failed scenario load: {}", e);
        }
        if let Err(e) = self.store.set_execution_plan(previous).await {
            warn!("Failed to restore the previous execution plan: {}", e);
        }
    }

    /// Stamp the loaded plan with the current time and push it to every
    /// registered node. Returns the number of nodes that accepted it.
    pub async fn start_scenario(&self) -> AppResult<usize> {
        let mut plan = self.store.get_execution_plan().await?;
        plan.start_time_ms = Utc::now().timestamp_millis();
        self.store.set_execution_plan(Some(plan.clone())).await?;

        let nodes = self.store.get_nodes().await?;
        let total = nodes.len();
        let timeout = self.config.dispatch_timeout();

        let dispatches = nodes.into_iter().map(|node| {
            let dispatcher = self.dispatcher.clone();
            let plan = plan.clone();
            async move {
                let uuid = node.uuid;
                let address = node.connection_info.to_string();
                match tokio::time::timeout(timeout, dispatcher.start_scenario(node, plan)).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError {
                        node: uuid,
                        address,
                        message: format!("no answer within {:?}", timeout),
                    }),
                }
            }
        });

        let failures: Vec<DispatchError> = join_all(dispatches)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if !failures.is_empty() {
            metrics::counter!("apate_scenario_dispatch_failures_total", failures.len() as u64);
            for failure in &failures {
                warn!("Failed to start scenario on {}", failure);
            }
            return Err(AppError::Dispatch(failures));
        }

        info!(nodes = total, start_time_ms = plan.start_time_ms, "Scenario started");
        Ok(total)
    }

    pub async fn status(&self) -> AppResult<ClusterStatus> {
        let nodes = self.store.get_nodes().await?;
        let count = |status: HealthStatus| nodes.iter().filter(|n| n.status == status).count();

        Ok(ClusterStatus {
            total_nodes: nodes.len(),
            healthy_nodes: count(HealthStatus::Healthy),
            unhealthy_nodes: count(HealthStatus::Unhealthy),
            queued_resources: self.store.queue_length().await?,
            scenario_loaded: self.store.get_execution_plan().await.is_ok(),
        })
    }

    /// Stop in-process apatelets and forget all nodes
    pub async fn shutdown(&self) {
        self.apatelets.cancel();
        if let Err(e) = self.store.clear_nodes().await {
            warn!("Failed to clear nodes on shutdown: {}", e);
        }
        metrics::gauge!("apate_nodes", 0.0);
    }

    async fn record_node_count(&self) {
        if let Ok(nodes) = self.store.get_nodes().await {
            metrics::gauge!("apate_nodes", nodes.len() as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cluster::MockClusterApi;
    use crate::error::{RunnerError, StoreError};
    use crate::models::{NodeGroup, NodeResources, NodeType, RunType, Task};
    use crate::runner::MockApateletRunner;
    use crate::service::dispatch::MockScenarioDispatcher;
    use crate::store::{ClusterStore, MockStore};

    fn scenario(amount: u32) -> PublicScenario {
        PublicScenario {
            nodes: vec![NodeType {
                node_type: "worker".to_string(),
                ram: "1GiB".to_string(),
                cpu_percent: 50,
                max_pods: 10,
            }],
            node_groups: vec![NodeGroup {
                group_name: "workers".to_string(),
                node_type: "worker".to_string(),
                amount,
            }],
            tasks: vec![Task {
                name: "crash".to_string(),
                time: "1s".to_string(),
                revert: false,
                node_groups: vec!["all".to_string()],
            }],
        }
    }

    fn orchestrator(
        store: Arc<ClusterStore>,
        runner: MockApateletRunner,
        cluster: MockClusterApi,
        dispatcher: MockScenarioDispatcher,
    ) -> Orchestrator {
        let registry = RunnerRegistry::new();
        registry.register(RunType::Routine, Arc::new(runner));
        Orchestrator::new(
            store,
            Arc::new(registry),
            Arc::new(cluster),
            Arc::new(dispatcher),
            Arc::new(ControlPlaneConfig {
                external_ip: "127.0.0.1".to_string(),
                ..ControlPlaneConfig::default()
            }),
        )
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 7], port))
    }

    #[tokio::test]
    async fn test_load_spawns_one_apatelet_per_resource() {
        let store = Arc::new(ClusterStore::new());
        let mut runner = MockApateletRunner::new();
        runner
            .expect_spawn_apatelets()
            .withf(|_, amount, env| *amount == 4 && env.control_plane_address == "127.0.0.1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = orchestrator(
            store.clone(),
            runner,
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        assert_eq!(service.load_scenario(scenario(4)).await.unwrap(), 4);

        assert_eq!(store.queue_length().await.unwrap(), 4);
        let plan = store.get_execution_plan().await.unwrap();
        assert_eq!(plan.tasks[0].node_set.len(), 4);
        assert_eq!(plan.start_time_ms, 0);
    }

    #[tokio::test]
    async fn test_failed_spawn_leaves_nothing_behind() {
        let store = Arc::new(ClusterStore::new());
        let mut runner = MockApateletRunner::new();
        runner
            .expect_spawn_apatelets()
            .returning(|_, _, _| Err(RunnerError::ImageUnavailable("apatelet".to_string())));

        let service = orchestrator(
            store.clone(),
            runner,
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        let err = service.load_scenario(scenario(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        assert_eq!(store.queue_length().await.unwrap(), 0);
        assert!(store.get_execution_plan().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_scenario_is_rejected_before_spawning() {
        let store = Arc::new(ClusterStore::new());
        let mut runner = MockApateletRunner::new();
        runner.expect_spawn_apatelets().never();

        let service = orchestrator(
            store.clone(),
            runner,
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        let mut bad = scenario(2);
        bad.tasks[0].node_groups = vec!["workers".to_string(), "workers".to_string()];

        let err = service.load_scenario(bad).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("workers")));
        assert_eq!(store.queue_length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_join_returns_resource_to_queue_head() {
        let queued = NodeResources {
            id: Uuid::new_v4(),
            ram_bytes: 1 << 30,
            cpu_percent: 50,
            max_pods: 10,
        };
        let expected = queued.id;

        let mut store = MockStore::new();
        store
            .expect_get_resource_from_queue()
            .times(1)
            .returning(move || Ok(Some(queued.clone())));
        store
            .expect_add_node()
            .returning(|node| Err(StoreError::DuplicateNode(node.uuid)));
        store
            .expect_requeue_resource()
            .withf(move |r| r.id == expected)
            .times(1)
            .returning(|_| Ok(()));
        store.expect_add_resources_to_queue().never();

        let service = Orchestrator::new(
            Arc::new(store),
            Arc::new(RunnerRegistry::new()),
            Arc::new(MockClusterApi::new()),
            Arc::new(MockScenarioDispatcher::new()),
            Arc::new(ControlPlaneConfig::default()),
        );
        let err = service
            .join_cluster(peer(40000), JoinRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_join_takes_queued_resources_in_order() {
        let store = Arc::new(ClusterStore::new());
        let mut runner = MockApateletRunner::new();
        runner.expect_spawn_apatelets().returning(|_, _, _| Ok(()));
        let service = orchestrator(
            store.clone(),
            runner,
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        store.set_kube_config(b"kubeconfig".to_vec()).await.unwrap();
        service.load_scenario(scenario(2)).await.unwrap();
        let plan = store.get_execution_plan().await.unwrap();

        let first = service
            .join_cluster(peer(40000), JoinRequest { listen_port: Some(7000) })
            .await
            .unwrap();
        let second = service
            .join_cluster(peer(40001), JoinRequest::default())
            .await
            .unwrap();
        let third = service
            .join_cluster(peer(40002), JoinRequest::default())
            .await
            .unwrap();

        assert_eq!(first.kube_config, b"kubeconfig".to_vec());
        assert_eq!(first.kube_context, "kind-apate");
        assert_eq!(
            first.resources.as_ref().map(|r| r.id.to_string()),
            Some(plan.tasks[0].node_set[0].clone())
        );
        assert_eq!(
            second.resources.as_ref().map(|r| r.id.to_string()),
            Some(plan.tasks[0].node_set[1].clone())
        );
        assert!(third.resources.is_none());

        let node = store
            .get_node(Uuid::parse_str(&first.node_uuid).unwrap())
            .await
            .unwrap();
        assert_eq!(node.connection_info, ConnectionInfo::new("10.0.0.7", 7000));
        assert_eq!(node.status, HealthStatus::Unknown);

        let node = store
            .get_node(Uuid::parse_str(&second.node_uuid).unwrap())
            .await
            .unwrap();
        assert_eq!(node.connection_info.port, 40001);
    }

    #[tokio::test]
    async fn test_leave_removes_node_even_if_cluster_fails() {
        let store = Arc::new(ClusterStore::new());
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_remove_node_from_cluster()
            .times(1)
            .returning(|_| Err(crate::error::ClusterError::Manager("down".to_string())));

        let service = orchestrator(
            store.clone(),
            MockApateletRunner::new(),
            cluster,
            MockScenarioDispatcher::new(),
        );
        let info = service.join_cluster(peer(1), JoinRequest::default()).await.unwrap();
        service.leave_cluster(&info.node_uuid).await.unwrap();
        assert!(store.get_nodes().await.unwrap().is_empty());

        let err = service.leave_cluster("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_start_without_scenario() {
        let service = orchestrator(
            Arc::new(ClusterStore::new()),
            MockApateletRunner::new(),
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        let err = service.start_scenario().await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_start_reaches_every_node_and_collects_failures() {
        let store = Arc::new(ClusterStore::new());
        let mut runner = MockApateletRunner::new();
        runner.expect_spawn_apatelets().returning(|_, _, _| Ok(()));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut dispatcher = MockScenarioDispatcher::new();
        dispatcher.expect_start_scenario().returning(move |node, plan| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(plan.start_time_ms > 0);
            if node.connection_info.port == 7001 {
                Err(DispatchError {
                    node: node.uuid,
                    address: node.connection_info.to_string(),
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(())
            }
        });

        let service = orchestrator(store.clone(), runner, MockClusterApi::new(), dispatcher);
        service.load_scenario(scenario(3)).await.unwrap();
        for port in [7000, 7001, 7002] {
            service
                .join_cluster(peer(port), JoinRequest::default())
                .await
                .unwrap();
        }

        let err = service.start_scenario().await.unwrap_err();
        match err {
            AppError::Dispatch(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].address, "10.0.0.7:7001");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(store.get_execution_plan().await.unwrap().start_time_ms > 0);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let store = Arc::new(ClusterStore::new());
        let service = orchestrator(
            store.clone(),
            MockApateletRunner::new(),
            MockClusterApi::new(),
            MockScenarioDispatcher::new(),
        );
        let a = service.join_cluster(peer(1), JoinRequest::default()).await.unwrap();
        service.join_cluster(peer(2), JoinRequest::default()).await.unwrap();
        store
            .set_node_status(Uuid::parse_str(&a.node_uuid).unwrap(), HealthStatus::Healthy)
            .await
            .unwrap();

        let status = service.status().await.unwrap();
        assert_eq!(status.total_nodes, 2);
        assert_eq!(status.healthy_nodes, 1);
        assert_eq!(status.unhealthy_nodes, 0);
        assert!(!status.scenario_loaded);

        service.shutdown().await;
        assert_eq!(service.status().await.unwrap().total_nodes, 0);
    }
}
