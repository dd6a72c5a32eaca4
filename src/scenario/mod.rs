//! Scenario normalization
//!
//! Turns a [`PublicScenario`] written by an operator into an
//! [`ExecutionPlan`] plus the [`NodeResources`] that have to be spawned for
//! it. Everything in here is pure: nothing is logged, stored or spawned.

pub mod deserialize;
pub mod duration;
pub mod nodeset;
pub mod size;

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ScenarioError;
use crate::models::{ExecutionPlan, NodeResources, NodeType, PublicScenario, ResolvedTask};

pub use deserialize::{from_bytes, from_file, ScenarioFormat};
pub use duration::parse_duration_ms;
pub use nodeset::{resolve_node_groups, ALL_NODES};
pub use size::parse_size;

/// Output of [`normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedScenario {
    pub plan: ExecutionPlan,
    pub resources: Vec<NodeResources>,
}

/// Normalize a scenario with random resource UUIDs
pub fn normalize(scenario: &PublicScenario) -> Result<NormalizedScenario, ScenarioError> {
    normalize_with(scenario, &mut Uuid::new_v4)
}

/// Normalize a scenario, drawing resource UUIDs from `next_id`
pub fn normalize_with(
    scenario: &PublicScenario,
    next_id: &mut impl FnMut() -> Uuid,
) -> Result<NormalizedScenario, ScenarioError> {
    let node_types: HashMap<&str, &NodeType> = scenario
        .nodes
        .iter()
        .map(|n| (n.node_type.as_str(), n))
        .collect();

    let total: usize = scenario.node_groups.iter().map(|g| g.amount as usize).sum();
    let mut resources = Vec::with_capacity(total);
    let mut ids_per_group: HashMap<&str, Vec<String>> = HashMap::new();

    for group in &scenario.node_groups {
        let node_type = node_types.get(group.node_type.as_str()).ok_or_else(|| {
            ScenarioError::UnknownNodeType {
                group: group.group_name.clone(),
                node_type: group.node_type.clone(),
            }
        })?;
        let ram_bytes = parse_size(&node_type.ram)?;

        if ids_per_group.contains_key(group.group_name.as_str()) {
            return Err(ScenarioError::DuplicateGroup(group.group_name.clone()));
        }
        let ids = ids_per_group.entry(group.group_name.as_str()).or_default();
        for _ in 0..group.amount {
            let id = next_id();
            ids.push(id.to_string());
            resources.push(NodeResources {
                id,
                ram_bytes,
                cpu_percent: node_type.cpu_percent,
                max_pods: node_type.max_pods,
            });
        }
    }

    let mut tasks = Vec::with_capacity(scenario.tasks.len());
    for task in &scenario.tasks {
        let timestamp_ms = parse_duration_ms(&task.time)?;
        let groups = resolve_node_groups(&task.node_groups, &scenario.node_groups).map_err(
            |source| ScenarioError::InvalidNodeSet {
                task: task.name.clone(),
                source,
            },
        )?;

        let node_set = groups
            .into_iter()
            .filter_map(|g| ids_per_group.get(g))
            .flatten()
            .cloned()
            .collect();

        tasks.push(ResolvedTask {
            name: task.name.clone(),
            revert_task: task.revert,
            timestamp_ms,
            node_set,
        });
    }

    Ok(NormalizedScenario {
        plan: ExecutionPlan {
            start_time_ms: 0,
            tasks,
        },
        resources,
    })
}
