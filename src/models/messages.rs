use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{HealthStatus, NodeResources};

/// Optional body of a join request
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Port the apatelet serves its scenario handler on
    #[serde(default)]
    pub listen_port: Option<u16>,
}

/// Everything an apatelet needs after joining
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinInformation {
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub kube_config: Vec<u8>,
    pub kube_context: String,
    #[serde(rename = "nodeUUID")]
    pub node_uuid: String,
    pub resources: Option<NodeResources>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LeaveInformation {
    #[serde(rename = "nodeUUID")]
    pub node_uuid: String,
}

/// Message sent by an apatelet over its health stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct NodeStatus {
    #[serde(rename = "nodeUUID")]
    pub node_uuid: String,
    pub status: HealthStatus,
}

/// Control plane answer to a health status message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Heartbeat {
    pub at: DateTime<Utc>,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

/// Summary of the Apate cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub unhealthy_nodes: usize,
    pub queued_resources: usize,
    pub scenario_loaded: bool,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
