use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::ExecutionPlan;
use crate::service::START_SCENARIO_PATH;

/// Receives the execution plan pushed by the control plane
#[derive(Clone, Default)]
pub struct ScenarioHandler {
    resource_id: Option<String>,
    plan: Arc<RwLock<Option<ExecutionPlan>>>,
}

impl ScenarioHandler {
    pub fn new(resource_id: Option<Uuid>) -> Self {
        Self {
            resource_id: resource_id.map(|id| id.to_string()),
            plan: Arc::new(RwLock::new(None)),
        }
    }

    /// Last plan received, if any
    pub async fn plan(&self) -> Option<ExecutionPlan> {
        self.plan.read().await.clone()
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(START_SCENARIO_PATH, post(start_scenario))
            .with_state(self)
    }
}

async fn start_scenario(State(handler): State<ScenarioHandler>, Json(plan): Json<ExecutionPlan>) -> Json<Value> {
    let own_tasks = match &handler.resource_id {
        Some(id) => plan.tasks_for(id).count(),
        None => 0,
    };
    info!(
        start_time_ms = plan.start_time_ms,
        tasks = plan.tasks.len(),
        own_tasks,
        "Received scenario"
    );

    *handler.plan.write().await = Some(plan);
    Json(json!({}))
}
