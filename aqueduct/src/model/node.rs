//! Pipeline node records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of work a pipeline node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Pulls data from an external source.
    Extractor,
    /// Reshapes, filters or aggregates the input port's data.
    Transformer,
    /// Writes the input port's data to an external sink.
    Loader,
    /// Partitions records into valid/invalid per configured rules.
    Validator,
    /// Groups and aggregates records.
    Aggregator,
    /// Passes data through; fan-out is expressed by its outgoing edges.
    Splitter,
    /// Concatenates the data arriving on all input ports.
    Joiner,
    /// Gates data on a condition for downstream branching.
    Conditional,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractor => write!(f, "extractor"),
            Self::Transformer => write!(f, "transformer"),
            Self::Loader => write!(f, "loader"),
            Self::Validator => write!(f, "validator"),
            Self::Aggregator => write!(f, "aggregator"),
            Self::Splitter => write!(f, "splitter"),
            Self::Joiner => write!(f, "joiner"),
            Self::Conditional => write!(f, "conditional"),
        }
    }
}

/// Canvas position of a node. Irrelevant to execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodePosition {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// One DAG vertex of a pipeline definition.
///
/// `id` is the node's stable identity for the pipeline's whole life; edges
/// reference it and execution records are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineNode {
    /// Stable node identifier, unique within the pipeline.
    pub id: String,
    /// The node kind, driving executor dispatch.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Kind-specific configuration blob.
    #[serde(default)]
    pub config: Value,
    /// Hard execution cutoff for a single attempt, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Number of retries after the initial attempt.
    #[serde(default)]
    pub retry_attempts: u32,
    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: f64,
    /// Disabled nodes are excluded from the execution graph.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// UI position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<NodePosition>,
}

fn default_timeout_seconds() -> f64 {
    300.0
}

fn default_retry_delay_seconds() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl PipelineNode {
    /// Creates a node with default timeout/retry settings.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            config: Value::Null,
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: 0,
            retry_delay_seconds: default_retry_delay_seconds(),
            enabled: true,
            position: None,
        }
    }

    /// Sets the kind-specific config.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout: f64) -> Self {
        self.timeout_seconds = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retries(mut self, attempts: u32, delay_seconds: f64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_seconds = delay_seconds;
        self
    }

    /// Disables the node without removing it from the definition.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_display() {
        assert_eq!(NodeKind::Extractor.to_string(), "extractor");
        assert_eq!(NodeKind::Conditional.to_string(), "conditional");
    }

    #[test]
    fn test_node_deserializes_with_defaults() {
        let node: PipelineNode =
            serde_json::from_value(json!({"id": "n1", "type": "transformer"})).unwrap();
        assert_eq!(node.kind, NodeKind::Transformer);
        assert!(node.enabled);
        assert_eq!(node.retry_attempts, 0);
        assert!((node.timeout_seconds - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_node_builder() {
        let node = PipelineNode::new("n1", NodeKind::Extractor)
            .with_retries(3, 0.5)
            .with_timeout_seconds(10.0)
            .disabled();
        assert_eq!(node.retry_attempts, 3);
        assert!(!node.enabled);
    }
}
