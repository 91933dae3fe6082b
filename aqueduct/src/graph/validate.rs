//! Definition-time graph validation.
//!
//! Definition-time strictness is deliberately stricter than run time: the
//! cycle check covers all declared nodes and edges, enabled or not, so a
//! definition cannot smuggle in a cycle behind a disabled flag.

use crate::errors::{AqueductError, CycleDetectedError, DefinitionError};
use crate::model::PipelineDefinition;
use crate::node::NodeConfig;
use std::collections::{HashMap, HashSet};

/// Validates a pipeline definition's structure.
///
/// Checks, in order: non-empty node list, node id uniqueness, per-node
/// config against the declared kind, edge endpoint existence, and
/// acyclicity over all declared elements.
///
/// # Errors
///
/// Returns the first violated rule with the offending ids.
pub fn validate_definition(definition: &PipelineDefinition) -> Result<(), AqueductError> {
    if definition.nodes.is_empty() {
        return Err(DefinitionError::EmptyDefinition.into());
    }

    let mut ids = HashSet::new();
    for node in &definition.nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(DefinitionError::DuplicateNodeId {
                node_id: node.id.clone(),
            }
            .into());
        }
        if let Err(message) = NodeConfig::parse(node.kind, &node.config) {
            return Err(DefinitionError::InvalidNodeConfig {
                node_id: node.id.clone(),
                message,
            }
            .into());
        }
    }

    for edge in &definition.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(DefinitionError::UnknownEdgeEndpoint {
                    source_id: edge.source.clone(),
                    target: edge.target.clone(),
                    unknown: endpoint.clone(),
                }
                .into());
            }
        }
    }

    if let Some(cycle_path) = find_cycle(definition) {
        return Err(CycleDetectedError::new(cycle_path).into());
    }

    Ok(())
}

/// DFS cycle detection over all declared nodes/edges. Returns the cycle
/// path, first id repeated at the end, when one exists.
fn find_cycle(definition: &PipelineDefinition) -> Option<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &definition.nodes {
        adjacency.entry(node.id.as_str()).or_default();
    }
    for edge in &definition.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if visited.contains(node) {
            return None;
        }
        if visiting.contains(node) {
            let start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(ToString::to_string).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }

        visiting.insert(node);
        stack.push(node);

        if let Some(targets) = adjacency.get(node) {
            for &target in targets {
                if let Some(cycle) = visit(target, adjacency, visiting, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        visiting.remove(node);
        visited.insert(node);
        None
    }

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    for node in &definition.nodes {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(
            node.id.as_str(),
            &adjacency,
            &mut visiting,
            &mut visited,
            &mut stack,
        ) {
            return Some(cycle);
        }
    }
    None
}
