use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A scenario as written by an operator
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicScenario {
    #[serde(default)]
    pub nodes: Vec<NodeType>,
    #[serde(default)]
    pub node_groups: Vec<NodeGroup>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A named node definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    pub node_type: String,
    /// Memory size, e.g. "2GiB" or "512M"
    pub ram: String,
    pub cpu_percent: i32,
    pub max_pods: i32,
}

/// A named group of identical nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub group_name: String,
    pub node_type: String,
    pub amount: u32,
}

/// A timed task targeting a set of node groups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    /// Offset from the scenario start, e.g. "10s", "1500ms", "2m"
    pub time: String,
    #[serde(default)]
    pub revert: bool,
    #[serde(default)]
    pub node_groups: Vec<String>,
}

/// A fully resolved scenario, ready to be pushed to apatelets
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Unix epoch milliseconds, 0 until the scenario is started
    pub start_time_ms: i64,
    pub tasks: Vec<ResolvedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTask {
    pub name: String,
    pub revert_task: bool,
    pub timestamp_ms: i32,
    /// Resource UUIDs this task applies to
    pub node_set: Vec<String>,
}

impl ExecutionPlan {
    /// Tasks whose node set contains the given resource id
    pub fn tasks_for(&self, resource_id: &str) -> impl Iterator<Item = &ResolvedTask> {
        let id = resource_id.to_string();
        self.tasks
            .iter()
            .filter(move |t| t.node_set.iter().any(|n| *n == id))
    }
}
