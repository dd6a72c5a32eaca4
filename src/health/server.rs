use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{HealthStatus, Heartbeat, NodeStatus};
use crate::store::Store;

/// Limits of a single control plane side health stream
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Longest wait for the next status report
    pub receive_timeout: Duration,
    /// After this the stream is closed and the node has to reconnect
    pub lifetime: Duration,
    /// The stream is dropped once more failures than this occurred
    pub max_failures: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(15),
            lifetime: Duration::from_secs(10 * 60),
            max_failures: 2,
        }
    }
}

/// Serve one apatelet's health stream.
///
/// Every status report is recorded in the store and answered with a
/// heartbeat. If the stream breaks down the reporting node is marked
/// unhealthy, which lets the watchdog evict it. Reaching the stream
/// lifetime closes the socket without changing the node's status.
pub async fn serve_stream(mut socket: WebSocket, store: Arc<dyn Store>, settings: StreamSettings) {
    debug!("Starting new health stream");

    let expiry = sleep(settings.lifetime);
    tokio::pin!(expiry);

    let mut node: Option<Uuid> = None;
    let mut failures = 0;
    let mut expired = false;

    while failures <= settings.max_failures {
        let received = tokio::select! {
            _ = &mut expiry => {
                expired = true;
                break;
            }
            received = timeout(settings.receive_timeout, socket.recv()) => received,
        };

        let text = match received {
            Err(_) => {
                warn!(node = ?node, "Health stream receive timed out");
                failures += 1;
                continue;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                warn!(node = ?node, "Health stream receive error: {}", e);
                failures += 1;
                continue;
            }
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(_))) => continue,
        };

        let report: NodeStatus = match serde_json::from_str(&text) {
            Ok(report) => report,
            Err(e) => {
                warn!(node = ?node, "Malformed health report: {}", e);
                failures += 1;
                continue;
            }
        };

        let uuid = match Uuid::parse_str(&report.node_uuid) {
            Ok(uuid) => uuid,
            Err(_) => {
                warn!(uuid = %report.node_uuid, "Stopping a health stream due to an invalid uuid");
                break;
            }
        };
        node = Some(uuid);

        if let Err(e) = store.set_node_status(uuid, report.status).await {
            warn!(node = %uuid, "Failed to record health status: {}", e);
            continue;
        }

        let heartbeat = match serde_json::to_string(&Heartbeat::now()) {
            Ok(heartbeat) => heartbeat,
            Err(e) => {
                warn!("Failed to encode heartbeat: {}", e);
                failures += 1;
                continue;
            }
        };
        if let Err(e) = socket.send(Message::Text(heartbeat)).await {
            warn!(node = %uuid, "Health stream send error: {}", e);
            failures += 1;
        }
    }

    if expired {
        info!(node = ?node, "Health stream reached its lifetime, closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: axum::extract::ws::close_code::NORMAL,
                reason: "stream lifetime reached".into(),
            })))
            .await;
        return;
    }

    if let Some(uuid) = node {
        info!(node = %uuid, "Health stream ended, marking node unhealthy");
        if let Err(e) = store.set_node_status(uuid, HealthStatus::Unhealthy).await {
            debug!(node = %uuid, "Could not mark node unhealthy: {}", e);
        }
    }
}
