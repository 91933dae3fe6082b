//! Pipeline records and the definition wire format.

use super::{PipelineEdge, PipelineNode};
use crate::utils::{now_utc, record_id, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The node/edge structure of a pipeline as submitted by callers.
///
/// This is the serialized form validated by [`crate::graph::validate_definition`]
/// and snapshotted onto each execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Declared nodes.
    #[serde(default)]
    pub nodes: Vec<PipelineNode>,
    /// Declared edges.
    #[serde(default)]
    pub edges: Vec<PipelineEdge>,
}

impl PipelineDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: PipelineNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: PipelineEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Lifecycle status of a pipeline definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Under construction; executable for manual testing.
    Draft,
    /// Validated and runnable.
    Active,
    /// Temporarily not accepting executions.
    Paused,
    /// Retired; kept for execution history.
    Stopped,
    /// Marked failed by an operator or health check.
    Failed,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineStatus {
    /// Returns true if new executions may be submitted in this status.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        matches!(self, Self::Active | Self::Draft)
    }
}

/// How an execution was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Requested directly by a user.
    Manual,
    /// Fired by a schedule.
    Scheduled,
    /// Fired by a platform event.
    Event,
    /// Fired by an inbound webhook.
    Webhook,
    /// Fired by an upstream data change.
    DataChange,
}

impl Default for TriggerType {
    fn default() -> Self {
        Self::Manual
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Event => write!(f, "event"),
            Self::Webhook => write!(f, "webhook"),
            Self::DataChange => write!(f, "data_change"),
        }
    }
}

/// A named, versioned DAG definition.
///
/// Pipelines are never hard-deleted while executions reference them;
/// retirement is a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline id.
    pub id: String,
    /// Pipeline name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Definition version, bumped on every structure update.
    pub version: u32,
    /// The node/edge structure.
    pub definition: PipelineDefinition,
    /// Lifecycle status.
    pub status: PipelineStatus,
    /// Default trigger type for this pipeline.
    pub trigger_type: TriggerType,
    /// Bound on concurrently active executions.
    pub max_concurrent_executions: u32,
    /// Overall execution timeout in seconds, if any.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    /// Who created the pipeline.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Id of the most recent execution.
    #[serde(default)]
    pub last_execution_id: Option<String>,
    /// When the most recent execution reached a terminal state.
    #[serde(default)]
    pub last_execution_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl Pipeline {
    /// Creates a draft pipeline with the given definition.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: PipelineDefinition) -> Self {
        let now = now_utc();
        Self {
            id: record_id("pipe"),
            name: name.into(),
            description: None,
            version: 1,
            definition,
            status: PipelineStatus::Draft,
            trigger_type: TriggerType::Manual,
            max_concurrent_executions: 1,
            timeout_seconds: None,
            created_by: None,
            last_execution_id: None,
            last_execution_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_executions(mut self, bound: u32) -> Self {
        self.max_concurrent_executions = bound;
        self
    }

    /// Sets the default trigger type.
    #[must_use]
    pub fn with_trigger_type(mut self, trigger: TriggerType) -> Self {
        self.trigger_type = trigger;
        self
    }

    /// Sets the creator.
    #[must_use]
    pub fn with_created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// Marks the pipeline active.
    pub fn activate(&mut self) {
        self.status = PipelineStatus::Active;
        self.updated_at = now_utc();
    }

    /// Records the terminal execution most recently observed.
    pub fn record_execution(&mut self, execution_id: impl Into<String>) {
        self.last_execution_id = Some(execution_id.into());
        self.last_execution_at = Some(now_utc());
    }
}
