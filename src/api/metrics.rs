use axum::{extract::State, response::IntoResponse};

use crate::api::AppState;

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Metrics in the Prometheus text format", body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    };

    ([("content-type", "text/plain; version=0.0.4; charset=utf-8")], body)
}
