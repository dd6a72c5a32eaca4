use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::ApateletRunner;
use crate::config::ApateletEnvironment;
use crate::error::RunnerError;

/// Starts one in-process apatelet. The future should signal `ReadySignal`
/// once the apatelet is up and keep running until the token is cancelled.
pub type ApateletStartFn = Arc<
    dyn Fn(ApateletEnvironment, CancellationToken, ReadySignal) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// One-shot readiness signal of a spawned apatelet. Only the first signal
/// is delivered, later ones are ignored.
#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<Mutex<Option<oneshot::Sender<Result<(), String>>>>>,
}

impl ReadySignal {
    pub fn channel() -> (Self, oneshot::Receiver<Result<(), String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Signal a successful start, returns false if a signal was already sent
    pub fn ready(&self) -> bool {
        self.send(Ok(()))
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.send(Err(reason.into()))
    }

    fn send(&self, result: Result<(), String>) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

/// Runs apatelets as tasks inside the control plane process.
///
/// Apatelets are started one at a time: the next one is only started once
/// the previous one signalled readiness or failed.
pub struct RoutineRunner {
    start: ApateletStartFn,
    base_port: u16,
    fallback_port: u16,
    control_plane_port: u16,
    kube_config_location: Option<String>,
    next_index: AtomicUsize,
}

impl RoutineRunner {
    pub fn new(start: ApateletStartFn, base_port: u16, fallback_port: u16, control_plane_port: u16) -> Self {
        Self {
            start,
            base_port,
            fallback_port,
            control_plane_port,
            kube_config_location: None,
            next_index: AtomicUsize::new(0),
        }
    }

    /// Let in-process apatelets share the control plane's kubeconfig file
    pub fn with_kube_config_location(mut self, location: impl Into<String>) -> Self {
        self.kube_config_location = Some(location.into());
        self
    }

    /// Listening port of the apatelet with the given index. A base port of 0
    /// leaves the choice to the operating system.
    pub fn port_for(&self, index: usize) -> Result<u16, RunnerError> {
        if self.base_port == 0 {
            return Ok(0);
        }

        let port = u16::try_from(index)
            .ok()
            .and_then(|i| self.base_port.checked_add(i))
            .ok_or_else(|| RunnerError::Command {
                command: "allocate apatelet port".to_string(),
                message: format!("no port left for apatelet {}", index),
            })?;

        if port == self.control_plane_port {
            Ok(self.fallback_port)
        } else {
            Ok(port)
        }
    }
}

#[async_trait]
impl ApateletRunner for RoutineRunner {
    async fn spawn_apatelets(
        &self,
        cancel: CancellationToken,
        amount: usize,
        env: ApateletEnvironment,
    ) -> Result<(), RunnerError> {
        let mut failed = 0;

        for _ in 0..amount {
            let index = self.next_index.fetch_add(1, Ordering::SeqCst);
            let mut apatelet_env = env.clone();
            apatelet_env.listen_port = self.port_for(index)?;
            if self.kube_config_location.is_some() {
                apatelet_env.kube_config_location = self.kube_config_location.clone();
            }

            let (signal, ready) = ReadySignal::channel();
            tokio::spawn(run_apatelet(
                self.start.clone(),
                apatelet_env,
                cancel.child_token(),
                signal,
            ));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
                outcome = ready => match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(reason)) => {
                        warn!(index, "Apatelet failed to start: {}", reason);
                        failed += 1;
                    }
                    Err(_) => {
                        warn!(index, "Apatelet stopped without signalling readiness");
                        failed += 1;
                    }
                },
            }
        }

        info!(amount, failed, "Finished spawning in-process apatelets");
        Ok(())
    }
}

async fn run_apatelet(
    start: ApateletStartFn,
    env: ApateletEnvironment,
    cancel: CancellationToken,
    signal: ReadySignal,
) {
    let port = env.listen_port;
    let unit_signal = signal.clone();
    let outcome = AssertUnwindSafe(async move { start(env, cancel, unit_signal).await })
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(panic) => Some(format!("apatelet panicked: {}", panic_message(panic))),
    };

    if let Some(reason) = failure {
        error!(port, "Apatelet stopped: {}", reason);
        signal.fail(reason);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic
                .downcast::<&'static str>()
                .map_or_else(|_| "unknown panic".to_owned(), |message| (*message).to_owned())
        },
        |message| *message,
    )
}
