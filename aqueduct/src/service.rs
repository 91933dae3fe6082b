//! Pipeline lifecycle and execution API.
//!
//! This is the crate's front door: an HTTP layer or scheduler daemon calls
//! it and nothing else. Runs proceed out of band on the tokio runtime; the
//! submit call returns as soon as the pending record exists.

use crate::alert::{LoggingNotifier, Notifier};
use crate::cancellation::CancellationToken;
use crate::errors::AqueductError;
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::validate_definition;
use crate::metrics::{compute_metrics, PipelineMetrics};
use crate::model::{
    NodeExecution, Pipeline, PipelineAlert, PipelineDefinition, PipelineExecution, PipelineStatus,
    TriggerType,
};
use crate::node::ConnectorRegistry;
use crate::scheduler::DagRunner;
use crate::store::PipelineStore;
use crate::utils::Timestamp;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionHandle {
    /// Id of the created execution.
    pub execution_id: String,
    /// Id of the pipeline it runs.
    pub pipeline_id: String,
}

/// Owns pipeline CRUD-with-validation, execution submission with the
/// concurrency bound, cancellation, and metrics queries.
///
/// The service keeps the only in-process registry of live executions: a
/// map from execution id to its cancellation token. At most one scheduler
/// per execution exists by construction, everything else is persisted.
pub struct PipelineService {
    store: Arc<dyn PipelineStore>,
    connectors: Arc<ConnectorRegistry>,
    events: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
    running: Arc<DashMap<String, Arc<CancellationToken>>>,
}

impl PipelineService {
    /// Creates a service with default (no-op) observability and logging
    /// notification.
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self {
            store,
            connectors: Arc::new(ConnectorRegistry::new()),
            events: Arc::new(NoOpEventSink),
            notifier: Arc::new(LoggingNotifier),
            running: Arc::new(DashMap::new()),
        }
    }

    /// Sets the connector registry.
    #[must_use]
    pub fn with_connectors(mut self, connectors: Arc<ConnectorRegistry>) -> Self {
        self.connectors = connectors;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Validates and stores a new draft pipeline.
    pub async fn create_pipeline(
        &self,
        name: impl Into<String> + Send,
        definition: PipelineDefinition,
    ) -> Result<Pipeline, AqueductError> {
        validate_definition(&definition)?;
        let pipeline = Pipeline::new(name, definition);
        self.store.insert_pipeline(pipeline.clone()).await?;
        info!(pipeline_id = %pipeline.id, name = %pipeline.name, "pipeline created");
        Ok(pipeline)
    }

    /// Replaces a pipeline's definition, bumping its version.
    pub async fn update_definition(
        &self,
        pipeline_id: &str,
        definition: PipelineDefinition,
    ) -> Result<Pipeline, AqueductError> {
        validate_definition(&definition)?;
        let mut pipeline = self.require_pipeline(pipeline_id).await?;
        pipeline.definition = definition;
        pipeline.version += 1;
        pipeline.updated_at = crate::utils::now_utc();
        self.store.update_pipeline(pipeline.clone()).await?;
        Ok(pipeline)
    }

    /// Activates a pipeline after re-validating its definition.
    pub async fn activate_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, AqueductError> {
        let mut pipeline = self.require_pipeline(pipeline_id).await?;
        validate_definition(&pipeline.definition)?;
        pipeline.activate();
        self.store.update_pipeline(pipeline.clone()).await?;
        Ok(pipeline)
    }

    /// Pauses a pipeline; running executions are unaffected.
    pub async fn pause_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, AqueductError> {
        self.transition(pipeline_id, PipelineStatus::Paused).await
    }

    /// Retires a pipeline; its execution history stays queryable.
    pub async fn stop_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, AqueductError> {
        self.transition(pipeline_id, PipelineStatus::Stopped).await
    }

    /// Registers an alert for its pipeline.
    pub async fn add_alert(&self, alert: PipelineAlert) -> Result<(), AqueductError> {
        self.require_pipeline(&alert.pipeline_id).await?;
        self.store.insert_alert(alert).await
    }

    /// Submits a new execution.
    ///
    /// Returns immediately with a handle to the `pending` record; the run
    /// proceeds out of band. Fails without creating a record when the
    /// pipeline is missing, not executable in its current status, or
    /// already at `max_concurrent_executions` non-terminal executions.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        trigger_type: TriggerType,
        trigger_data: Option<Value>,
        triggered_by: Option<String>,
        parameters: Option<Value>,
    ) -> Result<ExecutionHandle, AqueductError> {
        let pipeline = self.require_pipeline(pipeline_id).await?;

        if !pipeline.status.can_execute() {
            return Err(AqueductError::NotExecutable {
                pipeline_id: pipeline_id.to_string(),
                status: pipeline.status.to_string(),
            });
        }

        // Check-then-act against the live count; see DESIGN.md for the
        // accepted race under truly concurrent submissions.
        let active = self.store.count_active_executions(pipeline_id).await?;
        if active >= pipeline.max_concurrent_executions {
            return Err(AqueductError::CapacityExceeded {
                pipeline_id: pipeline_id.to_string(),
                limit: pipeline.max_concurrent_executions,
            });
        }

        let mut execution = PipelineExecution::new(&pipeline, trigger_type);
        if let Some(data) = trigger_data {
            execution = execution.with_trigger_data(data);
        }
        if let Some(user) = triggered_by {
            execution = execution.with_triggered_by(user);
        }
        if let Some(parameters) = parameters {
            execution = execution.with_parameters(parameters);
        }
        self.store.insert_execution(execution.clone()).await?;

        let token = CancellationToken::new();
        self.running
            .insert(execution.execution_id.clone(), token.clone());

        let runner = DagRunner::new(
            self.store.clone(),
            self.connectors.clone(),
            self.events.clone(),
            self.notifier.clone(),
        );
        let running = self.running.clone();
        let execution_id = execution.execution_id.clone();
        let handle_id = execution_id.clone();
        tokio::spawn(async move {
            runner.run(&execution_id, token).await;
            running.remove(&execution_id);
        });

        info!(
            pipeline_id,
            execution_id = %handle_id,
            trigger_type = %trigger_type,
            "execution submitted"
        );
        Ok(ExecutionHandle {
            execution_id: handle_id,
            pipeline_id: pipeline_id.to_string(),
        })
    }

    /// Cancels a pending or running execution.
    ///
    /// Returns false when the execution does not exist or is already
    /// terminal. Cooperative: in-flight node tasks run to completion or
    /// timeout; only future waves are prevented.
    pub async fn cancel_execution(&self, execution_id: &str) -> Result<bool, AqueductError> {
        let Some(mut execution) = self.store.execution(execution_id).await? else {
            return Ok(false);
        };
        if execution.status.is_terminal() {
            return Ok(false);
        }

        execution.mark_cancelled();
        self.store.update_execution(execution).await?;

        if let Some(entry) = self.running.get(execution_id) {
            entry.value().cancel("cancelled by request");
        }

        info!(execution_id, "execution cancelled");
        Ok(true)
    }

    /// Fetches an execution by id.
    pub async fn execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<PipelineExecution>, AqueductError> {
        self.store.execution(execution_id).await
    }

    /// Fetches an execution's node records.
    pub async fn node_executions(
        &self,
        execution_id: &str,
    ) -> Result<Vec<NodeExecution>, AqueductError> {
        self.store.node_executions(execution_id).await
    }

    /// Fetches a pipeline by id.
    pub async fn pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, AqueductError> {
        self.store.pipeline(pipeline_id).await
    }

    /// Computes execution metrics for a pipeline over a window.
    pub async fn pipeline_metrics(
        &self,
        pipeline_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<PipelineMetrics, AqueductError> {
        self.require_pipeline(pipeline_id).await?;
        let executions = self.store.executions_for_pipeline(pipeline_id).await?;
        Ok(compute_metrics(&executions, start, end))
    }

    /// Number of executions this service currently owns.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    async fn require_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, AqueductError> {
        self.store
            .pipeline(pipeline_id)
            .await?
            .ok_or_else(|| AqueductError::PipelineNotFound(pipeline_id.to_string()))
    }

    async fn transition(
        &self,
        pipeline_id: &str,
        status: PipelineStatus,
    ) -> Result<Pipeline, AqueductError> {
        let mut pipeline = self.require_pipeline(pipeline_id).await?;
        pipeline.status = status;
        pipeline.updated_at = crate::utils::now_utc();
        self.store.update_pipeline(pipeline.clone()).await?;
        Ok(pipeline)
    }
}

impl std::fmt::Debug for PipelineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineService")
            .field("running", &self.running.len())
            .finish()
    }
}
