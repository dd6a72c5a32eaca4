use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    Json,
};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::{ClusterStatus, JoinInformation, JoinRequest, LeaveInformation};

/// Join the apate cluster
///
/// The node's address is taken from the connection. The body may declare
/// the port the node serves its scenario handler on.
#[utoipa::path(
    post,
    path = "/api/v1/cluster/join",
    tag = "cluster",
    request_body(content = JoinRequest, description = "Optional listening port of the node"),
    responses(
        (status = 200, description = "Node registered", body = JoinInformation),
        (status = 409, description = "Node already registered", body = super::openapi::ErrorResponse),
    )
)]
pub async fn join(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Option<Json<JoinRequest>>,
) -> AppResult<Json<JoinInformation>> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let info = state.orchestrator.join_cluster(peer, request).await?;
    Ok(Json(info))
}

/// Leave the apate cluster
#[utoipa::path(
    post,
    path = "/api/v1/cluster/leave",
    tag = "cluster",
    request_body = LeaveInformation,
    responses(
        (status = 200, description = "Node removed"),
        (status = 400, description = "Invalid node uuid", body = super::openapi::ErrorResponse),
    )
)]
pub async fn leave(State(state): State<AppState>, Json(req): Json<LeaveInformation>) -> AppResult<Json<Value>> {
    state.orchestrator.leave_cluster(&req.node_uuid).await?;
    Ok(Json(json!({})))
}

/// Node counts and scenario state of the apate cluster
#[utoipa::path(
    get,
    path = "/api/v1/cluster/status",
    tag = "cluster",
    responses(
        (status = 200, description = "Cluster status", body = ClusterStatus),
    )
)]
pub async fn status(State(state): State<AppState>) -> AppResult<Json<ClusterStatus>> {
    Ok(Json(state.orchestrator.status().await?))
}
