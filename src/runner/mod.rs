//! Apatelet runners
//!
//! A runner knows how to materialize apatelets, the [`RunnerRegistry`] picks
//! one by [`RunType`].

pub mod container;
pub mod docker;
pub mod routine;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::config::ApateletEnvironment;
use crate::error::RunnerError;
use crate::models::RunType;

pub use container::{ContainerEngine, DockerCli};
pub use docker::DockerRunner;
pub use routine::{ApateletStartFn, ReadySignal, RoutineRunner};

/// Something that can create new apatelets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApateletRunner: Send + Sync {
    /// Spawn `amount` apatelets that will connect using `env`
    async fn spawn_apatelets(
        &self,
        cancel: CancellationToken,
        amount: usize,
        env: ApateletEnvironment,
    ) -> Result<(), RunnerError>;
}

/// Maps run types to runners. Registering a run type again replaces the
/// previous runner.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: RwLock<HashMap<RunType, Arc<dyn ApateletRunner>>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_type: RunType, runner: Arc<dyn ApateletRunner>) {
        self.runners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_type, runner);
    }

    pub fn get(&self, run_type: &RunType) -> Option<Arc<dyn ApateletRunner>> {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_type)
            .cloned()
    }

    pub fn registered(&self) -> Vec<RunType> {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Spawn `amount` apatelets with the runner registered for `run_type`
    pub async fn run(
        &self,
        run_type: &RunType,
        cancel: CancellationToken,
        amount: usize,
        env: ApateletEnvironment,
    ) -> Result<(), RunnerError> {
        let runner = self
            .get(run_type)
            .ok_or_else(|| RunnerError::UnknownRunType(run_type.clone()))?;

        tracing::info!(run_type = %run_type, amount, "Spawning apatelets");

        runner
            .spawn_apatelets(cancel, amount, env)
            .await
            .map_err(|e| RunnerError::Failed {
                run_type: run_type.clone(),
                source: Box::new(e),
            })
    }
}
