//! Storage seam for persisted records.
//!
//! The engine assumes at most one scheduler owns a given execution, so
//! every mutation is a single-record update under the backend's normal
//! consistency guarantees; no in-process locking is required of callers.

use crate::errors::AqueductError;
use crate::model::{NodeExecution, Pipeline, PipelineAlert, PipelineExecution};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Persistence backend for pipelines, executions and alerts.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Inserts a new pipeline.
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<(), AqueductError>;

    /// Updates an existing pipeline.
    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), AqueductError>;

    /// Fetches a pipeline by id.
    async fn pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, AqueductError>;

    /// Inserts a new execution.
    async fn insert_execution(&self, execution: PipelineExecution) -> Result<(), AqueductError>;

    /// Updates an existing execution.
    async fn update_execution(&self, execution: PipelineExecution) -> Result<(), AqueductError>;

    /// Fetches an execution by id.
    async fn execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<PipelineExecution>, AqueductError>;

    /// All executions of a pipeline, oldest first.
    async fn executions_for_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineExecution>, AqueductError>;

    /// Count of a pipeline's non-terminal executions.
    async fn count_active_executions(&self, pipeline_id: &str) -> Result<u32, AqueductError>;

    /// Inserts a new node execution record.
    async fn insert_node_execution(&self, record: NodeExecution) -> Result<(), AqueductError>;

    /// Updates an existing node execution record.
    async fn update_node_execution(&self, record: NodeExecution) -> Result<(), AqueductError>;

    /// All node execution records of an execution, creation order.
    async fn node_executions(
        &self,
        execution_id: &str,
    ) -> Result<Vec<NodeExecution>, AqueductError>;

    /// Inserts a new alert.
    async fn insert_alert(&self, alert: PipelineAlert) -> Result<(), AqueductError>;

    /// Updates an existing alert.
    async fn update_alert(&self, alert: PipelineAlert) -> Result<(), AqueductError>;

    /// All alerts configured for a pipeline.
    async fn alerts_for_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineAlert>, AqueductError>;
}

/// In-memory store for embedding and tests.
///
/// One mutex over all tables: submissions serialize, which also closes the
/// check-then-act window on the concurrency bound that a distributed
/// backend would leave open.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    pipelines: HashMap<String, Pipeline>,
    executions: HashMap<String, PipelineExecution>,
    node_executions: Vec<NodeExecution>,
    alerts: Vec<PipelineAlert>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<(), AqueductError> {
        self.inner
            .lock()
            .pipelines
            .insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), AqueductError> {
        let mut tables = self.inner.lock();
        if !tables.pipelines.contains_key(&pipeline.id) {
            return Err(AqueductError::Store(format!(
                "cannot update unknown pipeline '{}'",
                pipeline.id
            )));
        }
        tables.pipelines.insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    async fn pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, AqueductError> {
        Ok(self.inner.lock().pipelines.get(pipeline_id).cloned())
    }

    async fn insert_execution(&self, execution: PipelineExecution) -> Result<(), AqueductError> {
        self.inner
            .lock()
            .executions
            .insert(execution.execution_id.clone(), execution);
        Ok(())
    }

    async fn update_execution(&self, execution: PipelineExecution) -> Result<(), AqueductError> {
        let mut tables = self.inner.lock();
        if !tables.executions.contains_key(&execution.execution_id) {
            return Err(AqueductError::Store(format!(
                "cannot update unknown execution '{}'",
                execution.execution_id
            )));
        }
        tables
            .executions
            .insert(execution.execution_id.clone(), execution);
        Ok(())
    }

    async fn execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<PipelineExecution>, AqueductError> {
        Ok(self.inner.lock().executions.get(execution_id).cloned())
    }

    async fn executions_for_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineExecution>, AqueductError> {
        let mut executions: Vec<_> = self
            .inner
            .lock()
            .executions
            .values()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.created_at);
        Ok(executions)
    }

    async fn count_active_executions(&self, pipeline_id: &str) -> Result<u32, AqueductError> {
        let count = self
            .inner
            .lock()
            .executions
            .values()
            .filter(|e| e.pipeline_id == pipeline_id && !e.status.is_terminal())
            .count();
        Ok(count as u32)
    }

    async fn insert_node_execution(&self, record: NodeExecution) -> Result<(), AqueductError> {
        self.inner.lock().node_executions.push(record);
        Ok(())
    }

    async fn update_node_execution(&self, record: NodeExecution) -> Result<(), AqueductError> {
        let mut tables = self.inner.lock();
        match tables.node_executions.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => {
                // Records are created by the scheduler before the runner's
                // first persist; tolerate a late insert.
                tables.node_executions.push(record);
                Ok(())
            }
        }
    }

    async fn node_executions(
        &self,
        execution_id: &str,
    ) -> Result<Vec<NodeExecution>, AqueductError> {
        Ok(self
            .inner
            .lock()
            .node_executions
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: PipelineAlert) -> Result<(), AqueductError> {
        self.inner.lock().alerts.push(alert);
        Ok(())
    }

    async fn update_alert(&self, alert: PipelineAlert) -> Result<(), AqueductError> {
        let mut tables = self.inner.lock();
        match tables.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(existing) => {
                *existing = alert;
                Ok(())
            }
            None => Err(AqueductError::Store(format!(
                "cannot update unknown alert '{}'",
                alert.id
            ))),
        }
    }

    async fn alerts_for_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineAlert>, AqueductError> {
        Ok(self
            .inner
            .lock()
            .alerts
            .iter()
            .filter(|a| a.pipeline_id == pipeline_id)
            .cloned()
            .collect())
    }
}
