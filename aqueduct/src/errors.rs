//! Error types for the aqueduct engine.
//!
//! Definition-time errors are synchronous and actionable: they name the
//! violated rule and the offending node or edge ids. Run-time errors are
//! recorded on the owning execution and never escape the scheduler.

use thiserror::Error;

/// The main error type for aqueduct operations.
#[derive(Debug, Error)]
pub enum AqueductError {
    /// A pipeline definition failed validation.
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// A cycle was detected in a pipeline graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// The runtime graph made no progress with nodes still remaining.
    #[error("deadlocked execution: remaining nodes {remaining:?} have unsatisfiable dependencies")]
    Deadlocked {
        /// Node ids that could not be scheduled.
        remaining: Vec<String>,
    },

    /// A pipeline is at its concurrent-execution bound.
    #[error("pipeline '{pipeline_id}' is at its concurrency limit ({limit} active executions)")]
    CapacityExceeded {
        /// The pipeline id.
        pipeline_id: String,
        /// The configured `max_concurrent_executions`.
        limit: u32,
    },

    /// The pipeline's status does not permit new executions.
    #[error("pipeline '{pipeline_id}' cannot execute in status '{status}'")]
    NotExecutable {
        /// The pipeline id.
        pipeline_id: String,
        /// The current pipeline status.
        status: String,
    },

    /// A referenced pipeline does not exist.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// A referenced execution does not exist.
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// A node execution failed after exhausting its retries.
    #[error("node '{node_id}' failed: {message}")]
    NodeExecution {
        /// The node id.
        node_id: String,
        /// The failure message from the final attempt.
        message: String,
    },

    /// An execution was cancelled.
    #[error("execution cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error.
    #[error("store error: {0}")]
    Store(String),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error raised when a pipeline definition fails structural validation.
#[derive(Debug, Clone, Error)]
pub enum DefinitionError {
    /// The definition declares no nodes.
    #[error("pipeline definition has no nodes")]
    EmptyDefinition,

    /// Two nodes share the same id.
    #[error("duplicate node id '{node_id}'")]
    DuplicateNodeId {
        /// The duplicated id.
        node_id: String,
    },

    /// An edge references a node id that is not declared.
    #[error("edge '{source_id}' -> '{target}' references unknown node '{unknown}'")]
    UnknownEdgeEndpoint {
        /// The edge's source node id.
        source_id: String,
        /// The edge's target node id.
        target: String,
        /// The endpoint that is not declared.
        unknown: String,
    },

    /// A node's config does not match its declared type.
    #[error("invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig {
        /// The node id.
        node_id: String,
        /// What was wrong with the config.
        message: String,
    },
}

/// Error raised when a cycle is detected in a pipeline graph.
///
/// Carried both by definition-time validation (over all declared elements)
/// and by the defensive re-check on the enabled subgraph at run time.
#[derive(Debug, Clone, Error)]
#[error("pipeline contains cycles: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The node ids forming the cycle, first id repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}
