//! OpenAPI documentation for the Apate control plane API

use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

/// API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Apate control plane API",
        version = "1.0.0",
        description = "Control plane of an emulated Kubernetes cluster.\n\nVirtual nodes (apatelets) join and leave the cluster through this API and report their health over a websocket stream. Operators load scenarios, which spawn the nodes, and start them."
    ),
    servers(
        (url = "http://localhost:8085", description = "Local control plane")
    ),
    tags(
        (name = "cluster", description = "Node membership"),
        (name = "scenario", description = "Scenario loading and starting"),
        (name = "health", description = "Liveness and node health streams"),
        (name = "metrics", description = "Prometheus metrics")
    ),
    paths(
        crate::api::cluster::join,
        crate::api::cluster::leave,
        crate::api::cluster::status,
        crate::api::scenario::load,
        crate::api::scenario::start,
        crate::api::health::health_check,
        crate::api::health::health_stream,
        crate::api::metrics::metrics_handler,
    ),
    components(
        schemas(
            crate::models::JoinRequest,
            crate::models::JoinInformation,
            crate::models::LeaveInformation,
            crate::models::ClusterStatus,
            crate::models::NodeStatus,
            crate::models::Heartbeat,
            crate::models::HealthStatus,
            crate::models::NodeResources,
            crate::models::PublicScenario,
            crate::models::NodeType,
            crate::models::NodeGroup,
            crate::models::Task,
            crate::models::ExecutionPlan,
            crate::models::ResolvedTask,
            crate::api::scenario::ScenarioResponse,
            crate::api::health::HealthResponse,
            ErrorResponse,
            ErrorBody,
        )
    )
)]
pub struct ApiDoc;

/// Error response returned by the API
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine readable error code
    #[schema(example = "BAD_REQUEST")]
    pub code: String,
    pub message: String,
    /// Per node failures of a scenario start
    pub details: Option<serde_json::Value>,
}
