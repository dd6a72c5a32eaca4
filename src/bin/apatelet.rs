use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apate::{apatelet::start_apatelet, config::ApateletEnvironment, runner::ReadySignal};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = ApateletEnvironment::load()?;
    tracing::info!(
        control_plane = %format!("{}:{}", env.control_plane_address, env.control_plane_port),
        port = env.listen_port,
        "Starting apatelet"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
        }
        shutdown.cancel();
    });

    let (ready, started) = ReadySignal::channel();
    tokio::spawn(async move {
        if let Ok(Ok(())) = started.await {
            tracing::info!("Apatelet is up");
        }
    });

    start_apatelet(env, cancel, ready).await
}
