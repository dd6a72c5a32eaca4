use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::health::serve_stream;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness of the control plane
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Control plane is up", body = HealthResponse),
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health stream of a node
///
/// The node sends a `NodeStatus` text frame every second and receives a
/// `Heartbeat` frame for each of them.
#[utoipa::path(
    get,
    path = "/api/v1/health/stream",
    tag = "health",
    responses(
        (status = 101, description = "Switching to the websocket protocol"),
    )
)]
pub async fn health_stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let store = state.orchestrator.store().clone();
    let settings = state.stream_settings;
    ws.on_upgrade(move |socket| serve_stream(socket, store, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
    }
}
