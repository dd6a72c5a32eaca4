//! End to end: a control plane on a real listener spawning in-process
//! apatelets, which join, stream their health and receive the scenario.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apate::{
    api::AppState,
    apatelet,
    cluster::DetachedCluster,
    config::ControlPlaneConfig,
    models::{PublicScenario, RunType},
    runner::{RoutineRunner, RunnerRegistry},
    scenario::{from_bytes, ScenarioFormat},
    service::{HttpDispatcher, Orchestrator},
    store::{ClusterStore, Store},
};

const SCENARIO: &str = r#"
nodes:
  - nodeType: tiny
    ram: 512MiB
    cpuPercent: 25
    maxPods: 10
nodeGroups:
  - groupName: first
    nodeType: tiny
    amount: 1
  - groupName: second
    nodeType: tiny
    amount: 1
tasks:
  - name: stop-first
    time: 5s
    nodeGroups: [first]
  - name: start-first
    time: 10s
    revert: true
    nodeGroups: [first]
"#;

async fn control_plane() -> (Arc<Orchestrator>, Arc<ClusterStore>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = Arc::new(ControlPlaneConfig {
        listen_address: "127.0.0.1".to_string(),
        listen_port: port,
        external_ip: "127.0.0.1".to_string(),
        apatelet_run_type: RunType::Routine,
        ..ControlPlaneConfig::default()
    });

    let store = Arc::new(ClusterStore::new());
    let runners = RunnerRegistry::new();
    runners.register(
        RunType::Routine,
        Arc::new(RoutineRunner::new(apatelet::start_fn(), 0, 0, port)),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(runners),
        Arc::new(DetachedCluster),
        Arc::new(HttpDispatcher::new(Duration::from_secs(5)).unwrap()),
        config,
    ));

    let app = apate::create_router(AppState::new(orchestrator.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (orchestrator, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_reaches_in_process_apatelets() {
    let (orchestrator, store) = control_plane().await;
    let scenario: PublicScenario = from_bytes(SCENARIO.as_bytes(), ScenarioFormat::Yaml).unwrap();

    let spawned = tokio::time::timeout(Duration::from_secs(20), orchestrator.load_scenario(scenario))
        .await
        .expect("loading should not hang")
        .unwrap();
    assert_eq!(spawned, 2);

    let nodes = store.get_nodes().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(store.queue_length().await.unwrap(), 0);
    for node in &nodes {
        assert_eq!(node.connection_info.address, "127.0.0.1");
        assert_ne!(node.connection_info.port, 0);
        assert_eq!(node.resources.as_ref().map(|r| r.ram_bytes), Some(512 * 1024 * 1024));
    }

    // every apatelet reports itself healthy over its stream
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = orchestrator.status().await.unwrap();
            if status.healthy_nodes == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("apatelets never became healthy");

    let reached = orchestrator.start_scenario().await.unwrap();
    assert_eq!(reached, 2);

    let plan = store.get_execution_plan().await.unwrap();
    assert!(plan.start_time_ms > 0);
    assert_eq!(plan.tasks.len(), 2);
    assert!(plan.tasks[1].revert_task);

    orchestrator.shutdown().await;
    assert!(store.get_nodes().await.unwrap().is_empty());
}
