use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::PublicScenario;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScenarioResponse {
    /// Nodes spawned by a load or reached by a start
    pub nodes: usize,
}

/// Load a scenario and spawn its nodes
#[utoipa::path(
    post,
    path = "/api/v1/scenario/load",
    tag = "scenario",
    request_body = PublicScenario,
    responses(
        (status = 200, description = "Scenario loaded", body = ScenarioResponse),
        (status = 400, description = "Invalid scenario", body = super::openapi::ErrorResponse),
        (status = 500, description = "Nodes could not be spawned", body = super::openapi::ErrorResponse),
    )
)]
pub async fn load(
    State(state): State<AppState>,
    Json(scenario): Json<PublicScenario>,
) -> AppResult<Json<ScenarioResponse>> {
    let nodes = state.orchestrator.load_scenario(scenario).await?;
    Ok(Json(ScenarioResponse { nodes }))
}

/// Start the loaded scenario on every node
#[utoipa::path(
    post,
    path = "/api/v1/scenario/start",
    tag = "scenario",
    responses(
        (status = 200, description = "Scenario started", body = ScenarioResponse),
        (status = 400, description = "No scenario loaded", body = super::openapi::ErrorResponse),
        (status = 502, description = "Some nodes could not be reached", body = super::openapi::ErrorResponse),
    )
)]
pub async fn start(State(state): State<AppState>) -> AppResult<Json<ScenarioResponse>> {
    let nodes = state.orchestrator.start_scenario().await?;
    Ok(Json(ScenarioResponse { nodes }))
}
