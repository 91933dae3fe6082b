//! Projection of a persisted definition into an execution graph.

use super::{ExecutionGraph, GraphEdge, GraphNode};
use crate::edge::EdgeTransformation;
use crate::errors::{AqueductError, DefinitionError};
use crate::model::PipelineDefinition;
use crate::node::NodeConfig;
use std::collections::HashMap;

/// Builds the execution graph for one run.
///
/// Only enabled nodes are included, and only edges that are themselves
/// enabled and connect two included nodes. Iteration follows definition
/// order, so the same persisted state always yields the same graph.
///
/// Acyclicity is guaranteed at definition time, but the enabled subset is
/// re-checked here to fail fast on corrupted data.
///
/// # Errors
///
/// Returns `InvalidNodeConfig` when a node's config no longer parses, and
/// `CycleDetected` when the enabled subset is cyclic.
pub fn build_execution_graph(
    definition: &PipelineDefinition,
) -> Result<ExecutionGraph, AqueductError> {
    let mut nodes = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for node in definition.nodes.iter().filter(|n| n.enabled) {
        let config = NodeConfig::parse(node.kind, &node.config).map_err(|message| {
            DefinitionError::InvalidNodeConfig {
                node_id: node.id.clone(),
                message,
            }
        })?;
        index.insert(node.id.as_str(), nodes.len());
        nodes.push(GraphNode {
            node_id: node.id.clone(),
            kind: node.kind,
            config,
            timeout_seconds: node.timeout_seconds,
            retry_attempts: node.retry_attempts,
            retry_delay_seconds: node.retry_delay_seconds,
        });
    }

    let mut edges = Vec::new();
    for edge in definition.edges.iter().filter(|e| e.enabled) {
        let (Some(&source), Some(&target)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) else {
            // Either endpoint disabled: the edge is excluded with it.
            continue;
        };
        edges.push(GraphEdge {
            source,
            target,
            source_port: edge.source_port.clone(),
            target_port: edge.target_port.clone(),
            transformation: EdgeTransformation::from_config(edge.transformation.as_ref()),
            condition: edge.condition.clone(),
        });
    }

    let graph = ExecutionGraph::from_parts(nodes, edges);
    graph.topological_order()?;
    Ok(graph)
}
