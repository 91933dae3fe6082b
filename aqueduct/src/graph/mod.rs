//! The in-memory execution graph.
//!
//! Built once per run from the persisted definition, restricted to enabled
//! elements. Nodes and edges live in arenas and reference each other by
//! index, so there are no pointer cycles and no reliance on lazy loading.

mod build;
mod validate;

pub use build::build_execution_graph;
pub use validate::validate_definition;

use crate::condition::Condition;
use crate::edge::EdgeTransformation;
use crate::errors::CycleDetectedError;
use crate::model::NodeKind;
use crate::node::NodeConfig;
use std::collections::{HashMap, HashSet};

/// One executable vertex of the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The node's stable id from the definition.
    pub node_id: String,
    /// The node kind.
    pub kind: NodeKind,
    /// Parsed, kind-checked config.
    pub config: NodeConfig,
    /// Per-attempt timeout in seconds.
    pub timeout_seconds: f64,
    /// Retries after the initial attempt.
    pub retry_attempts: u32,
    /// Fixed delay between attempts in seconds.
    pub retry_delay_seconds: f64,
}

/// One arc of the graph, endpoints given as node indices.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Index of the source node.
    pub source: usize,
    /// Index of the target node.
    pub target: usize,
    /// Source port name.
    pub source_port: String,
    /// Target port name.
    pub target_port: String,
    /// Parsed transformation, if the edge carries a recognized one.
    pub transformation: Option<EdgeTransformation>,
    /// Routing condition, if any.
    pub condition: Option<Condition>,
}

/// A directed acyclic graph of pipeline nodes, ready for scheduling.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    index: HashMap<String, usize>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
}

impl ExecutionGraph {
    /// Creates a graph from arenas. Adjacency is derived here.
    #[must_use]
    pub(crate) fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.node_id.clone(), i))
            .collect();

        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut outgoing = vec![Vec::new(); nodes.len()];
        for (edge_idx, edge) in edges.iter().enumerate() {
            incoming[edge.target].push(edge_idx);
            outgoing[edge.source].push(edge_idx);
        }

        Self {
            nodes,
            edges,
            index,
            incoming,
            outgoing,
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in definition order.
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// All edges, in definition order.
    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// The node at `idx`.
    #[must_use]
    pub fn node(&self, idx: usize) -> &GraphNode {
        &self.nodes[idx]
    }

    /// The edge at `idx`.
    #[must_use]
    pub fn edge(&self, idx: usize) -> &GraphEdge {
        &self.edges[idx]
    }

    /// Looks up a node index by id.
    #[must_use]
    pub fn node_index(&self, node_id: &str) -> Option<usize> {
        self.index.get(node_id).copied()
    }

    /// Indices of edges arriving at `idx`.
    #[must_use]
    pub fn incoming_edges(&self, idx: usize) -> &[usize] {
        &self.incoming[idx]
    }

    /// Indices of edges leaving `idx`.
    #[must_use]
    pub fn outgoing_edges(&self, idx: usize) -> &[usize] {
        &self.outgoing[idx]
    }

    /// Distinct predecessor node indices of `idx`.
    #[must_use]
    pub fn predecessors(&self, idx: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.incoming[idx]
            .iter()
            .map(|&edge_idx| self.edges[edge_idx].source)
            .filter(|&pred| seen.insert(pred))
            .collect()
    }

    /// Computes a topological ordering of node indices.
    ///
    /// # Errors
    ///
    /// Returns the cycle path when the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<usize>, CycleDetectedError> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut queue: Vec<usize> = (0..self.nodes.len())
            .filter(|&idx| in_degree[idx] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop() {
            order.push(idx);
            for &edge_idx in &self.outgoing[idx] {
                let target = self.edges[edge_idx].target;
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    queue.push(target);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(CycleDetectedError::new(self.find_cycle_path()))
        }
    }

    /// The ready set: nodes not yet started whose every predecessor has
    /// already produced output.
    #[must_use]
    pub fn ready_nodes(&self, completed: &HashSet<usize>, started: &HashSet<usize>) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|idx| !started.contains(idx))
            .filter(|&idx| {
                self.predecessors(idx)
                    .iter()
                    .all(|pred| completed.contains(pred))
            })
            .collect()
    }

    /// Reconstructs one cycle path for error reporting.
    fn find_cycle_path(&self) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit(
            graph: &ExecutionGraph,
            idx: usize,
            colors: &mut [Color],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            colors[idx] = Color::Gray;
            stack.push(idx);

            for &edge_idx in &graph.outgoing[idx] {
                let target = graph.edges[edge_idx].target;
                match colors[target] {
                    Color::Gray => {
                        let start = stack.iter().position(|&n| n == target).unwrap_or(0);
                        let mut cycle: Vec<usize> = stack[start..].to_vec();
                        cycle.push(target);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = visit(graph, target, colors, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            stack.pop();
            colors[idx] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            if colors[idx] == Color::White {
                let mut stack = Vec::new();
                if let Some(cycle) = visit(self, idx, &mut colors, &mut stack) {
                    return cycle
                        .into_iter()
                        .map(|i| self.nodes[i].node_id.clone())
                        .collect();
                }
            }
        }
        Vec::new()
    }
}
