//! Execution records: one per pipeline run, one per node per run.

use super::{Pipeline, TriggerType};
use crate::utils::{definition_fingerprint, execution_id, node_execution_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status of a pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted, not yet started.
    Pending,
    /// Waves are being scheduled.
    Running,
    /// All nodes completed.
    Completed,
    /// A node exhausted its retries, or the graph was unrunnable.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// A node is in a retry backoff.
    Retrying,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status is absorbing.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One run of a pipeline.
///
/// Carries an immutable snapshot of the definition it ran against plus a
/// fingerprint of that snapshot, so the run stays auditable after the
/// pipeline is edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// Globally unique execution id.
    pub execution_id: String,
    /// Owning pipeline id.
    pub pipeline_id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// How the run was initiated.
    pub trigger_type: TriggerType,
    /// Trigger payload, if any.
    #[serde(default)]
    pub trigger_data: Option<Value>,
    /// Who initiated the run.
    #[serde(default)]
    pub triggered_by: Option<String>,
    /// Caller-supplied run parameters.
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Definition snapshot used for this run.
    pub definition_snapshot: Value,
    /// SHA-256 of the snapshot.
    pub definition_fingerprint: String,
    /// When the scheduler picked the run up.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the run reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in seconds.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Aggregate output of terminal nodes.
    #[serde(default)]
    pub output: Option<Value>,
    /// Aggregate run metrics.
    #[serde(default)]
    pub metrics: Option<Value>,
    /// Error from the failing node or scheduler, if any.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl PipelineExecution {
    /// Creates a pending execution for the given pipeline.
    #[must_use]
    pub fn new(pipeline: &Pipeline, trigger_type: TriggerType) -> Self {
        let snapshot = serde_json::to_value(&pipeline.definition).unwrap_or_default();
        let fingerprint = definition_fingerprint(&snapshot);
        Self {
            execution_id: execution_id(),
            pipeline_id: pipeline.id.clone(),
            status: ExecutionStatus::Pending,
            trigger_type,
            trigger_data: None,
            triggered_by: None,
            parameters: None,
            definition_snapshot: snapshot,
            definition_fingerprint: fingerprint,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            output: None,
            metrics: None,
            error_message: None,
            created_at: now_utc(),
        }
    }

    /// Sets the trigger payload.
    #[must_use]
    pub fn with_trigger_data(mut self, data: Value) -> Self {
        self.trigger_data = Some(data);
        self
    }

    /// Sets the initiator.
    #[must_use]
    pub fn with_triggered_by(mut self, user: impl Into<String>) -> Self {
        self.triggered_by = Some(user.into());
        self
    }

    /// Sets caller-supplied parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Transitions to running. No-op once terminal.
    pub fn mark_running(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Some(now_utc());
    }

    /// Transitions to completed with the aggregate output. No-op once terminal.
    pub fn mark_completed(&mut self, output: Value) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.finish();
    }

    /// Transitions to failed with the triggering error. No-op once terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error.into());
        self.finish();
    }

    /// Transitions to cancelled. No-op once terminal.
    pub fn mark_cancelled(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Cancelled;
        self.finish();
    }

    fn finish(&mut self) {
        let now = now_utc();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_seconds = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }
    }
}

/// Status of one node execution within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    /// Created; task not yet started.
    Pending,
    /// Attempt in flight.
    Running,
    /// Sleeping before the next attempt.
    Retrying,
    /// Produced output.
    Completed,
    /// Retries exhausted.
    Failed,
    /// Skipped because the execution was cancelled.
    Cancelled,
}

impl fmt::Display for NodeRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Retrying => write!(f, "retrying"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl NodeRunStatus {
    /// Returns true if the status is absorbing.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One node's execution within one pipeline execution.
///
/// Retries happen in place: the same record, `attempt` incremented, up to
/// the node's configured retry limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Execution-scoped record id.
    pub id: String,
    /// Owning pipeline execution id.
    pub execution_id: String,
    /// The node this record tracks.
    pub node_id: String,
    /// Current status.
    pub status: NodeRunStatus,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// When the first attempt started.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the record reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in seconds.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Snapshot of the merged input ports.
    #[serde(default)]
    pub input: Option<Value>,
    /// Snapshot of the produced output.
    #[serde(default)]
    pub output: Option<Value>,
    /// Records received across all input ports.
    pub records_in: u64,
    /// Records present in the output.
    pub records_out: u64,
    /// Failure message from the final attempt, if any.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl NodeExecution {
    /// Creates a pending record for a node that just became ready.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            id: node_execution_id(),
            execution_id: execution_id.into(),
            node_id: node_id.into(),
            status: NodeRunStatus::Pending,
            attempt: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            input: None,
            output: None,
            records_in: 0,
            records_out: 0,
            error_message: None,
        }
    }

    /// Starts a new attempt. No-op once terminal.
    pub fn begin_attempt(&mut self, input: Value, records_in: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.attempt += 1;
        self.status = NodeRunStatus::Running;
        self.records_in = records_in;
        if self.started_at.is_none() {
            self.started_at = Some(now_utc());
        }
        self.input = Some(input);
    }

    /// Marks a retry backoff in progress. No-op once terminal.
    pub fn mark_retrying(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = NodeRunStatus::Retrying;
        self.error_message = Some(error.into());
    }

    /// Records a successful attempt. No-op once terminal.
    pub fn mark_completed(&mut self, output: Value, records_out: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = NodeRunStatus::Completed;
        self.output = Some(output);
        self.records_out = records_out;
        self.error_message = None;
        self.finish();
    }

    /// Records failure after retries were exhausted. No-op once terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = NodeRunStatus::Failed;
        self.error_message = Some(error.into());
        self.finish();
    }

    fn finish(&mut self) {
        let now = now_utc();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_seconds = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }
    }
}
