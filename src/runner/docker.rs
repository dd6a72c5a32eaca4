use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ApateletRunner, ContainerEngine};
use crate::config::ApateletEnvironment;
use crate::error::RunnerError;
use crate::models::PullPolicy;

pub const APATELET_CONTAINER_PREFIX: &str = "apatelet-";

/// Runs every apatelet in its own container
pub struct DockerRunner {
    engine: Arc<dyn ContainerEngine>,
    image: String,
    pull_policy: PullPolicy,
}

impl DockerRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, image: impl Into<String>, pull_policy: PullPolicy) -> Self {
        Self {
            engine,
            image: image.into(),
            pull_policy,
        }
    }

    async fn prepare_image(&self) -> Result<(), RunnerError> {
        match self.pull_policy {
            PullPolicy::AlwaysPull => self.engine.pull_image(&self.image).await,
            PullPolicy::PullIfNotLocal => {
                if self.engine.image_exists(&self.image).await? {
                    Ok(())
                } else {
                    self.engine.pull_image(&self.image).await
                }
            }
            PullPolicy::AlwaysLocal => {
                if self.engine.image_exists(&self.image).await? {
                    Ok(())
                } else {
                    Err(RunnerError::ImageUnavailable(self.image.clone()))
                }
            }
        }
    }
}

#[async_trait]
impl ApateletRunner for DockerRunner {
    async fn spawn_apatelets(
        &self,
        cancel: CancellationToken,
        amount: usize,
        env: ApateletEnvironment,
    ) -> Result<(), RunnerError> {
        tracing::info!(policy = %self.pull_policy, image = %self.image, "Using pull policy to spawn apatelets");

        self.prepare_image().await?;
        self.engine
            .remove_exited_containers(APATELET_CONTAINER_PREFIX)
            .await?;

        let vars = env.to_env_vars();
        let spawns = (0..amount).map(|_| {
            let name = format!("{}{}", APATELET_CONTAINER_PREFIX, Uuid::new_v4());
            let vars = vars.clone();
            async move {
                self.engine
                    .run_container(&name, &self.image, vars)
                    .await
                    .map_err(|e| RunnerError::Container {
                        name,
                        source: Box::new(e),
                    })
            }
        });

        tokio::select! {
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
            result = try_join_all(spawns) => result.map(|_| ()),
        }
    }
}
