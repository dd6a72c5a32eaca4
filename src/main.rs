use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apate::{
    api::AppState,
    apatelet,
    cluster::{read_kube_config, ClusterApi, DetachedCluster, KindManager, KubeCluster, ManagedCluster},
    config::ControlPlaneConfig,
    create_router,
    health::Watchdog,
    models::RunType,
    runner::{DockerCli, DockerRunner, RoutineRunner, RunnerRegistry},
    service::{HttpDispatcher, Orchestrator},
    store::{ClusterStore, Store},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Apate control plane");

    let mut config = ControlPlaneConfig::load()?;
    tracing::info!(run_type = %config.apatelet_run_type, "Configuration loaded");

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            None
        }
    };

    // Backing cluster
    let mut managed = None;
    let cluster: Arc<dyn ClusterApi>;
    let kube_config: Vec<u8>;
    if config.manage_cluster {
        let created = Arc::new(
            ManagedCluster::create(
                Arc::new(KindManager::default()),
                &config.cluster_name,
                &config.kube_config_location,
                &config.manager_config_location,
                true,
            )
            .await
            .context("failed to create managed cluster")?,
        );
        config.kube_context = created.context().to_string();
        kube_config = created.kube_config().to_vec();
        cluster = created.clone();
        managed = Some(created);
    } else {
        match read_kube_config(&config.kube_config_location).await {
            Ok(bytes) => {
                cluster = match KubeCluster::from_kube_config(&bytes, &config.kube_context).await {
                    Ok(connected) => Arc::new(connected),
                    Err(e) => {
                        tracing::warn!("Backing cluster not reachable, node removal disabled: {}", e);
                        Arc::new(DetachedCluster)
                    }
                };
                kube_config = bytes;
            }
            Err(e) => {
                tracing::warn!("No kubeconfig found, node removal disabled: {}", e);
                cluster = Arc::new(DetachedCluster);
                kube_config = Vec::new();
            }
        }
    }

    let store: Arc<dyn Store> = Arc::new(ClusterStore::new());
    store.set_kube_config(kube_config).await?;

    // Runners
    let runners = Arc::new(RunnerRegistry::new());
    runners.register(
        RunType::Docker,
        Arc::new(DockerRunner::new(
            Arc::new(DockerCli::default()),
            config.apatelet_image.clone(),
            config.docker_policy,
        )),
    );
    runners.register(
        RunType::Routine,
        Arc::new(
            RoutineRunner::new(
                apatelet::start_fn(),
                config.routine_base_port,
                config.routine_fallback_port,
                config.listen_port,
            )
            .with_kube_config_location(config.kube_config_location.clone()),
        ),
    );

    let config = Arc::new(config);
    let dispatcher = Arc::new(HttpDispatcher::new(config.dispatch_timeout())?);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        runners,
        cluster.clone(),
        dispatcher,
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    let watchdog = Watchdog::new(store.clone(), cluster, config.watchdog_interval()).spawn(cancel.clone());

    let mut state = AppState::new(orchestrator.clone());
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.listen_address, config.listen_port)
        .parse()
        .context("invalid listen address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    cancel.cancel();
    orchestrator.shutdown().await;
    let _ = watchdog.await;

    if let Some(managed) = managed {
        if let Err(e) = managed.delete().await {
            tracing::error!("Failed to delete managed cluster: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
