//! Error types for the Apate control plane
//!
//! Every subsystem has its own typed error. Handlers work with [`AppError`],
//! which every domain error converts into and which renders itself as an
//! HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::RunType;

pub type AppResult<T> = Result<T, AppError>;

/// Reasons a task's node group list is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeSetError {
    #[error("duplicate node group name '{0}' in task")]
    Duplicate(String),
    #[error("group name '{0}' doesn't exist")]
    UnknownGroup(String),
    #[error("can only use 'all' as the only node group")]
    AllCombined,
}

/// Validation errors produced while normalizing a public scenario
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("node group '{group}' references unknown node type '{node_type}'")]
    UnknownNodeType { group: String, node_type: String },

    #[error("node group '{0}' is declared more than once")]
    DuplicateGroup(String),

    #[error("could not parse memory size '{0}'")]
    InvalidSize(String),

    #[error("could not parse duration '{0}', possible postfixes are ms, s, m, h or no postfix")]
    InvalidDuration(String),

    #[error("invalid node set in task '{task}': {source}")]
    InvalidNodeSet {
        task: String,
        #[source]
        source: NodeSetError,
    },

    #[error("failed to read scenario file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Deserialize(String),
}

/// Errors reported by the cluster store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("node with uuid '{0}' already exists")]
    DuplicateNode(Uuid),

    #[error("node with uuid '{0}' not found")]
    NodeNotFound(Uuid),

    #[error("no scenario has been loaded yet")]
    NoScenario,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while spawning apatelets
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unable to find runner type {0}, have you registered it?")]
    UnknownRunType(RunType),

    #[error("failed to spawn apatelets using runner {run_type}: {source}")]
    Failed {
        run_type: RunType,
        #[source]
        source: Box<RunnerError>,
    },

    #[error("image {0} not available locally")]
    ImageUnavailable(String),

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("failed to execute {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn container {name}: {source}")]
    Container {
        name: String,
        #[source]
        source: Box<RunnerError>,
    },

    #[error("spawning was cancelled")]
    Cancelled,
}

/// Errors raised by the backing Kubernetes cluster or its manager
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("cluster manager failed: {0}")]
    Manager(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("removing node {node} failed ({})", removal_failures(.store, .cluster))]
    Removal {
        node: Uuid,
        store: Option<String>,
        cluster: Option<String>,
    },
}

fn removal_failures(store: &Option<String>, cluster: &Option<String>) -> String {
    let mut parts = Vec::new();
    if let Some(e) = store {
        parts.push(format!("apate store: {}", e));
    }
    if let Some(e) = cluster {
        parts.push(format!("kubernetes: {}", e));
    }
    parts.join("; ")
}

/// A failed scenario dispatch to a single apatelet
#[derive(Debug, Clone, Error)]
#[error("node {node} at {address}: {message}")]
pub struct DispatchError {
    pub node: Uuid,
    pub address: String,
    pub message: String,
}

/// Errors on the node side of the health stream
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("failed to set up health stream: {0}")]
    Connect(String),

    #[error("failed to send health status message over stream: {0}")]
    Send(String),

    #[error("stream died: {0}")]
    Receive(String),

    #[error("stream timed out")]
    Timeout,

    #[error("stream closed by control plane")]
    Closed,
}

/// Handler-facing error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error("kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("failed to start scenario on {} node(s)", .0.len())]
    Dispatch(Vec<DispatchError>),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Kubernetes(_) => (StatusCode::INTERNAL_SERVER_ERROR, "KUBERNETES_ERROR"),
            AppError::Dispatch(_) => (StatusCode::BAD_GATEWAY, "DISPATCH_ERROR"),
        }
    }
}

impl From<ScenarioError> for AppError {
    fn from(e: ScenarioError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateNode(_) => AppError::Conflict(e.to_string()),
            StoreError::NodeNotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::NoScenario => AppError::BadRequest(e.to_string()),
            StoreError::Unavailable(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RunnerError> for AppError {
    fn from(e: RunnerError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<ClusterError> for AppError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Kubernetes(err) => AppError::Kubernetes(err),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, "{}", self);
        }

        let details = match &self {
            AppError::Dispatch(failures) => Some(json!(failures
                .iter()
                .map(|f| json!({
                    "node": f.node,
                    "address": f.address,
                    "message": f.message,
                }))
                .collect::<Vec<_>>())),
            _ => None,
        };

        let mut error = json!({
            "code": code,
            "message": self.to_string(),
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let id = Uuid::new_v4();
        let (status, _) = AppError::from(StoreError::DuplicateNode(id)).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = AppError::from(StoreError::NodeNotFound(id)).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_scenario_error_keeps_offending_input() {
        let err = AppError::from(ScenarioError::InvalidSize("a42B".to_string()));
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(err.to_string().contains("a42B"));
    }

    #[test]
    fn test_removal_error_combines_both_failures() {
        let err = ClusterError::Removal {
            node: Uuid::nil(),
            store: Some("locked".to_string()),
            cluster: Some("404".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("apate store: locked"));
        assert!(msg.contains("kubernetes: 404"));
    }
}
