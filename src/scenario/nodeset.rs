use std::collections::HashSet;

use crate::error::NodeSetError;
use crate::models::NodeGroup;

/// Selector that expands to every declared node group
pub const ALL_NODES: &str = "all";

/// Resolve the node groups a task targets into declared group names.
///
/// `["all"]` expands to every group in declaration order. Otherwise each
/// name must be declared exactly once in the selector.
pub fn resolve_node_groups<'a>(
    selector: &'a [String],
    groups: &'a [NodeGroup],
) -> Result<Vec<&'a str>, NodeSetError> {
    if let [only] = selector {
        if only.trim() == ALL_NODES {
            return Ok(groups.iter().map(|g| g.group_name.as_str()).collect());
        }
    }

    let declared: HashSet<&str> = groups.iter().map(|g| g.group_name.as_str()).collect();
    let mut seen = HashSet::with_capacity(selector.len());
    let mut resolved = Vec::with_capacity(selector.len());

    for name in selector {
        let name = name.trim();
        if name == ALL_NODES {
            return Err(NodeSetError::AllCombined);
        }
        if !seen.insert(name) {
            return Err(NodeSetError::Duplicate(name.to_string()));
        }
        if !declared.contains(name) {
            return Err(NodeSetError::UnknownGroup(name.to_string()));
        }
        resolved.push(name);
    }

    Ok(resolved)
}
