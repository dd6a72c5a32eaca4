//! Apatelet runtime
//!
//! An apatelet joins the apate cluster, serves a scenario handler for the
//! control plane to push execution plans to, and reports its health over a
//! stream until it is stopped. It then leaves the cluster again.
//!
//! The same runtime backs the standalone `apatelet` binary and the in-process
//! apatelets started by [`RoutineRunner`](crate::runner::RoutineRunner).

pub mod client;
pub mod server;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cluster::write_kube_config;
use crate::config::ApateletEnvironment;
use crate::error::HealthError;
use crate::health::{ErrorCallback, HealthClient, HEALTH_STREAM_PATH};
use crate::models::{HealthStatus, JoinInformation};
use crate::runner::{ApateletStartFn, ReadySignal};

pub use client::ControlPlaneClient;
pub use server::ScenarioHandler;

/// Times a broken health stream is re-established before giving up
pub const HEALTH_RETRIES: usize = 3;

/// Start function for in-process apatelets
pub fn start_fn() -> ApateletStartFn {
    Arc::new(|env: ApateletEnvironment, cancel: CancellationToken, ready: ReadySignal| {
        start_apatelet(env, cancel, ready).boxed()
    })
}

/// Run an apatelet until `cancel` fires. `ready` is signalled once the node
/// joined, serves its scenario handler and streams its health.
pub async fn start_apatelet(env: ApateletEnvironment, cancel: CancellationToken, ready: ReadySignal) -> Result<()> {
    let client = ControlPlaneClient::new(env.clone())?;

    let listener = TcpListener::bind((env.listen_address.as_str(), env.listen_port))
        .await
        .with_context(|| format!("failed to listen on {}:{}", env.listen_address, env.listen_port))?;
    let port = listener.local_addr()?.port();

    let info = client.join(port).await?;
    info!(node = %info.node_uuid, port, "Joined apate cluster");

    let outcome = run_joined(&env, &info, listener, &cancel, ready).await;

    if let Err(e) = client.leave(&info.node_uuid).await {
        warn!(node = %info.node_uuid, "Failed to leave apate cluster: {:#}", e);
    } else {
        info!(node = %info.node_uuid, "Left apate cluster");
    }

    outcome
}

async fn run_joined(
    env: &ApateletEnvironment,
    info: &JoinInformation,
    listener: TcpListener,
    cancel: &CancellationToken,
    ready: ReadySignal,
) -> Result<()> {
    let uuid = Uuid::parse_str(&info.node_uuid).context("control plane sent an invalid node uuid")?;

    if let Some(location) = &env.kube_config_location {
        if !Path::new(location).exists() {
            write_kube_config(location, &info.kube_config).await?;
        }
    }

    let handler = ScenarioHandler::new(info.resources.as_ref().map(|r| r.id));
    let stop = cancel.child_token();
    let server_stop = stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, handler.router())
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
    });

    let health = HealthClient::new(env.control_plane_ws_url(HEALTH_STREAM_PATH), uuid);
    health.set_status(HealthStatus::Healthy).await;
    let on_error: ErrorCallback = Arc::new(|e: &HealthError| warn!("Health stream error: {}", e));
    let health_cancel = stop.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health.run_with_retry(health_cancel, HEALTH_RETRIES, on_error).await {
            error!("Giving up on health stream: {}", e);
        }
    });

    ready.ready();
    cancel.cancelled().await;

    stop.cancel();
    let _ = health_task.await;
    match server.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("scenario handler failed"),
        Err(e) => Err(e).context("scenario handler task failed"),
    }
}
