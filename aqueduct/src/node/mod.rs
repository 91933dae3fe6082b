//! Single-node execution: dispatch, timeout and retry.

mod config;
mod connector;
mod handlers;

pub use config::{
    AggregateFunction, AggregatorConfig, ConditionalConfig, ExtractorConfig, FieldDataType,
    LoaderConfig, NodeConfig, SinkRef, SourceKind, SourceRef, TransformerConfig, ValidationRule,
    ValidatorConfig,
};
pub use connector::{
    CollectingSink, ConnectorError, ConnectorRegistry, SinkConnector, SourceConnector,
    StaticSource,
};
pub use handlers::{record_count, value_items, INPUT_PORT};

use crate::events::EventSink;
use crate::graph::GraphNode;
use crate::model::NodeExecution;
use crate::store::PipelineStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Executes one node with the configured timeout and retry policy.
///
/// The runner owns the node's [`NodeExecution`] record for the duration of
/// the call: every attempt transition is persisted before the next
/// suspension point. Failures never escape as errors; they come back as the
/// `Err` half of the returned result with the record already terminal.
#[derive(Clone)]
pub struct NodeRunner {
    connectors: Arc<ConnectorRegistry>,
    store: Arc<dyn PipelineStore>,
    events: Arc<dyn EventSink>,
}

impl NodeRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        connectors: Arc<ConnectorRegistry>,
        store: Arc<dyn PipelineStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connectors,
            store,
            events,
        }
    }

    /// Runs the node to a terminal state.
    ///
    /// Makes `1 + retry_attempts` attempts, sleeping `retry_delay_seconds`
    /// between them. A timed-out attempt counts as a failed attempt. Each
    /// retry re-runs with the same input.
    pub async fn execute(
        &self,
        mut record: NodeExecution,
        node: &GraphNode,
        inputs: HashMap<String, Value>,
    ) -> (NodeExecution, Result<Value, String>) {
        let input_snapshot = serde_json::to_value(&inputs).unwrap_or(Value::Null);
        let records_in: u64 = inputs.values().map(record_count).sum();
        let attempt_timeout = Duration::from_secs_f64(node.timeout_seconds.max(0.001));

        loop {
            record.begin_attempt(input_snapshot.clone(), records_in);
            self.persist(&record).await;
            self.events.try_emit(
                "node.started",
                Some(serde_json::json!({
                    "execution_id": record.execution_id,
                    "node_id": node.node_id,
                    "attempt": record.attempt,
                })),
            );

            let outcome = match timeout(attempt_timeout, self.dispatch(node, &inputs)).await {
                Ok(result) => result,
                Err(_) => Err(format!(
                    "node '{}' timed out after {}s",
                    node.node_id, node.timeout_seconds
                )),
            };

            match outcome {
                Ok(output) => {
                    let records_out = record_count(&output);
                    record.mark_completed(output.clone(), records_out);
                    self.persist(&record).await;
                    self.events.try_emit(
                        "node.completed",
                        Some(serde_json::json!({
                            "execution_id": record.execution_id,
                            "node_id": node.node_id,
                            "attempt": record.attempt,
                            "records_out": records_out,
                        })),
                    );
                    return (record, Ok(output));
                }
                Err(error) => {
                    if record.attempt <= node.retry_attempts {
                        debug!(
                            node_id = %node.node_id,
                            attempt = record.attempt,
                            delay_seconds = node.retry_delay_seconds,
                            error = %error,
                            "node attempt failed, retrying"
                        );
                        record.mark_retrying(&error);
                        self.persist(&record).await;
                        self.events.try_emit(
                            "node.retrying",
                            Some(serde_json::json!({
                                "execution_id": record.execution_id,
                                "node_id": node.node_id,
                                "attempt": record.attempt,
                                "error": error,
                            })),
                        );
                        sleep(Duration::from_secs_f64(node.retry_delay_seconds.max(0.0))).await;
                    } else {
                        warn!(
                            node_id = %node.node_id,
                            attempts = record.attempt,
                            error = %error,
                            "node failed after exhausting retries"
                        );
                        record.mark_failed(&error);
                        self.persist(&record).await;
                        self.events.try_emit(
                            "node.failed",
                            Some(serde_json::json!({
                                "execution_id": record.execution_id,
                                "node_id": node.node_id,
                                "attempts": record.attempt,
                                "error": error,
                            })),
                        );
                        return (record, Err(error));
                    }
                }
            }
        }
    }

    /// Exhaustive dispatch over the node kind's parsed config.
    async fn dispatch(&self, node: &GraphNode, inputs: &HashMap<String, Value>) -> Result<Value, String> {
        match &node.config {
            NodeConfig::Extractor(config) => handlers::run_extractor(config, &self.connectors).await,
            NodeConfig::Loader(config) => handlers::run_loader(config, inputs, &self.connectors).await,
            NodeConfig::Transformer(config) => handlers::run_transformer(config, inputs),
            NodeConfig::Validator(config) => handlers::run_validator(config, inputs),
            NodeConfig::Aggregator(config) => handlers::run_aggregator(config, inputs),
            NodeConfig::Conditional(config) => handlers::run_conditional(config, inputs),
            NodeConfig::Splitter => handlers::run_splitter(inputs),
            NodeConfig::Joiner => handlers::run_joiner(inputs),
        }
    }

    async fn persist(&self, record: &NodeExecution) {
        if let Err(error) = self.store.update_node_execution(record.clone()).await {
            warn!(record_id = %record.id, error = %error, "failed to persist node execution");
        }
    }
}

impl std::fmt::Debug for NodeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRunner")
            .field("connectors", &self.connectors)
            .finish()
    }
}
