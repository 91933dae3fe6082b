//! Pipeline edge records.

use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One DAG arc: data flows from `source`'s output port to `target`'s
/// input port, optionally transformed and gated on the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Port on the source the data is read from.
    #[serde(default = "default_source_port")]
    pub source_port: String,
    /// Port on the target the data is delivered to.
    #[serde(default = "default_target_port")]
    pub target_port: String,
    /// Declarative transformation applied to the data crossing this edge.
    /// Unrecognized transformation types fall back to passthrough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Value>,
    /// Routing condition; when false, the target receives empty data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Disabled edges are excluded from the execution graph.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_source_port() -> String {
    "output".to_string()
}

fn default_target_port() -> String {
    "input".to_string()
}

fn default_enabled() -> bool {
    true
}

impl PipelineEdge {
    /// Creates an edge with default ports.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_port: default_source_port(),
            target_port: default_target_port(),
            transformation: None,
            condition: None,
            enabled: true,
        }
    }

    /// Sets the transformation config.
    #[must_use]
    pub fn with_transformation(mut self, transformation: Value) -> Self {
        self.transformation = Some(transformation);
        self
    }

    /// Sets the routing condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the target port name.
    #[must_use]
    pub fn with_target_port(mut self, port: impl Into<String>) -> Self {
        self.target_port = port.into();
        self
    }

    /// Disables the edge without removing it from the definition.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
