use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Health of an apatelet as last reported over its health stream
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// No heartbeat received yet
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Resources of a single emulated node, produced by scenario normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeResources {
    pub id: Uuid,
    pub ram_bytes: i64,
    pub cpu_percent: i32,
    pub max_pods: i32,
}

/// Where an apatelet can be reached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ConnectionInfo {
    pub address: String,
    pub port: u16,
}

impl ConnectionInfo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Build an http URL for the given path on this endpoint
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.authority(), path)
    }

    /// Build a websocket URL for the given path on this endpoint
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.authority(), path)
    }

    fn authority(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.authority())
    }
}

/// An apatelet registered in the Apate cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uuid: Uuid,
    pub connection_info: ConnectionInfo,
    pub status: HealthStatus,
    pub resources: Option<NodeResources>,
}

impl Node {
    pub fn new(uuid: Uuid, connection_info: ConnectionInfo, resources: Option<NodeResources>) -> Self {
        Self {
            uuid,
            connection_info,
            status: HealthStatus::Unknown,
            resources,
        }
    }
}

/// Name of the node as registered in the backing Kubernetes cluster
pub fn kubernetes_node_name(uuid: &Uuid) -> String {
    format!("apatelet-{}", uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_wire_names() {
        assert_eq!(HealthStatus::Unhealthy.to_string(), "UNHEALTHY");
        assert_eq!("HEALTHY".parse::<HealthStatus>().unwrap(), HealthStatus::Healthy);
        assert_eq!(
            serde_json::to_value(HealthStatus::Unknown).unwrap(),
            serde_json::json!("UNKNOWN")
        );
    }

    #[test]
    fn test_connection_info_urls() {
        let info = ConnectionInfo::new("10.0.0.4", 7001);
        assert_eq!(info.http_url("/api/v1/scenario/start"), "http://10.0.0.4:7001/api/v1/scenario/start");

        let v6 = ConnectionInfo::new("::1", 8085);
        assert_eq!(v6.ws_url("/x"), "ws://[::1]:8085/x");
    }

    #[test]
    fn test_new_node_starts_unknown() {
        let id = Uuid::new_v4();
        let node = Node::new(id, ConnectionInfo::new("127.0.0.1", 1), None);
        assert_eq!(node.status, HealthStatus::Unknown);
        assert_eq!(kubernetes_node_name(&node.uuid), format!("apatelet-{}", id));
    }
}
