//! Apate control plane library
//!
//! Emulates large Kubernetes clusters: virtual nodes (apatelets) join a real
//! backing cluster, register with the control plane and run timed scenarios.

pub mod api;
pub mod apatelet;
pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod runner;
pub mod scenario;
pub mod service;
pub mod store;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::AppState;

/// Create the control plane router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/health", get(api::health::health_check))
        // Cluster membership
        .route("/api/v1/cluster/join", post(api::cluster::join))
        .route("/api/v1/cluster/leave", post(api::cluster::leave))
        .route("/api/v1/cluster/status", get(api::cluster::status))
        // Scenarios
        .route("/api/v1/scenario/load", post(api::scenario::load))
        .route("/api/v1/scenario/start", post(api::scenario::start))
        // Health stream (WebSocket)
        .route(health::HEALTH_STREAM_PATH, get(api::health::health_stream))
        // Metrics (Prometheus)
        .route("/metrics", get(api::metrics::metrics_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
