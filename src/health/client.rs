use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::HealthError;
use crate::models::{HealthStatus, Heartbeat, NodeStatus};

const SEND_INTERVAL: Duration = Duration::from_secs(1);
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Called for every error either half of a stream runs into
pub type ErrorCallback = Arc<dyn Fn(&HealthError) + Send + Sync>;

/// Node side of the health stream
#[derive(Clone)]
pub struct HealthClient {
    url: String,
    uuid: String,
    status: Arc<RwLock<HealthStatus>>,
}

/// A running health stream
pub struct HealthStream {
    stop: CancellationToken,
    sender: JoinHandle<Option<HealthError>>,
    receiver: JoinHandle<Option<HealthError>>,
}

impl HealthStream {
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait until both halves ended, returns the error that ended the stream
    pub async fn wait(self) -> Option<HealthError> {
        let (sent, received) = tokio::join!(self.sender, self.receiver);
        sent.ok().flatten().or(received.ok().flatten())
    }
}

impl HealthClient {
    pub fn new(url: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            url: url.into(),
            uuid: uuid.to_string(),
            status: Arc::new(RwLock::new(HealthStatus::Unknown)),
        }
    }

    /// Set the status reported to the control plane
    pub async fn set_status(&self, status: HealthStatus) {
        *self.status.write().await = status;
    }

    pub async fn status(&self) -> HealthStatus {
        *self.status.read().await
    }

    /// Open the stream and start the sender and receiver loops. Both loops
    /// stop after the first error, which is passed to `on_error`.
    pub async fn start_stream(
        &self,
        cancel: &CancellationToken,
        on_error: ErrorCallback,
    ) -> Result<HealthStream, HealthError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| HealthError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();
        let stop = cancel.child_token();

        debug!(url = %self.url, "Health stream established");

        let sender = {
            let stop = stop.clone();
            let status = self.status.clone();
            let uuid = self.uuid.clone();
            let on_error = on_error.clone();
            tokio::spawn(async move {
                let mut ticker = interval(SEND_INTERVAL);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => {
                            let _ = sink.close().await;
                            return None;
                        }
                        _ = ticker.tick() => {}
                    }

                    // the status may not change between reading and sending it
                    let result = {
                        let current = status.read().await;
                        let report = NodeStatus {
                            node_uuid: uuid.clone(),
                            status: *current,
                        };
                        match serde_json::to_string(&report) {
                            Ok(text) => sink
                                .send(Message::Text(text))
                                .await
                                .map_err(|e| HealthError::Send(e.to_string())),
                            Err(e) => Err(HealthError::Send(e.to_string())),
                        }
                    };

                    if let Err(e) = result {
                        on_error(&e);
                        stop.cancel();
                        return Some(e);
                    }
                }
            })
        };

        let receiver = {
            let stop = stop.clone();
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = stop.cancelled() => return None,
                        next = timeout(RECEIVE_TIMEOUT, stream.next()) => next,
                    };

                    let error = match next {
                        Err(_) => HealthError::Timeout,
                        Ok(None) => HealthError::Receive("connection lost".to_string()),
                        Ok(Some(Err(e))) => HealthError::Receive(e.to_string()),
                        Ok(Some(Ok(Message::Close(_)))) => HealthError::Closed,
                        Ok(Some(Ok(Message::Text(text)))) => {
                            if let Ok(heartbeat) = serde_json::from_str::<Heartbeat>(&text) {
                                trace!(at = %heartbeat.at, "Heartbeat received");
                            }
                            continue;
                        }
                        Ok(Some(Ok(_))) => continue,
                    };

                    on_error(&error);
                    stop.cancel();
                    return Some(error);
                }
            })
        };

        Ok(HealthStream {
            stop,
            sender,
            receiver,
        })
    }

    /// Keep a health stream open until `cancel` fires. A broken stream is
    /// re-established up to `retries` times; a stream closed by the control
    /// plane is always re-established. When retries run out the status is
    /// set to unhealthy and the last error returned.
    pub async fn run_with_retry(
        &self,
        cancel: CancellationToken,
        retries: usize,
        on_error: ErrorCallback,
    ) -> Result<(), HealthError> {
        let mut remaining = retries;

        loop {
            let ended = match self.start_stream(&cancel, on_error.clone()).await {
                Ok(stream) => stream.wait().await,
                Err(e) => {
                    on_error(&e);
                    Some(e)
                }
            };

            if cancel.is_cancelled() {
                return Ok(());
            }

            match ended {
                None => return Ok(()),
                Some(HealthError::Closed) => {
                    info!("Health stream closed by control plane, reconnecting");
                }
                Some(e) => {
                    if remaining == 0 {
                        self.set_status(HealthStatus::Unhealthy).await;
                        return Err(e);
                    }
                    remaining -= 1;
                    warn!(remaining, "Health stream failed, retrying: {}", e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(RECONNECT_DELAY) => {}
            }
        }
    }
}
