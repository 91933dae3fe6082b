//! Wave-parallel DAG execution.
//!
//! The runner executes the graph breadth-first over dependencies: every
//! node whose predecessors have all produced output runs concurrently in
//! the current wave, and the wave is fully joined before the next one is
//! computed. Failure is fail-fast at wave granularity: nodes already in
//! flight finish, no further wave starts.

mod integration_tests;

use crate::alert::{AlertEvaluator, Notifier};
use crate::cancellation::CancellationToken;
use crate::edge::deliver_edge_value;
use crate::errors::AqueductError;
use crate::events::EventSink;
use crate::graph::{build_execution_graph, ExecutionGraph};
use crate::model::{ExecutionStatus, NodeExecution, PipelineDefinition, PipelineExecution};
use crate::node::{value_items, NodeRunner};
use crate::store::PipelineStore;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Executes one pipeline execution to a terminal state.
///
/// One runner owns one execution at a time; all shared state lives in the
/// store. The runner never returns an error: every failure mode lands in
/// the execution record.
pub struct DagRunner {
    store: Arc<dyn PipelineStore>,
    connectors: Arc<crate::node::ConnectorRegistry>,
    events: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
}

impl DagRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn PipelineStore>,
        connectors: Arc<crate::node::ConnectorRegistry>,
        events: Arc<dyn EventSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            connectors,
            events,
            notifier,
        }
    }

    /// Runs the execution to completion and returns its terminal status.
    ///
    /// The definition snapshot stored on the execution is what runs, not
    /// the pipeline's current definition.
    pub async fn run(
        &self,
        execution_id: &str,
        token: Arc<CancellationToken>,
    ) -> ExecutionStatus {
        let mut execution = match self.store.execution(execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                warn!(execution_id, "execution not found, nothing to run");
                return ExecutionStatus::Failed;
            }
            Err(error) => {
                warn!(execution_id, error = %error, "failed to load execution");
                return ExecutionStatus::Failed;
            }
        };

        // Cancelled (or otherwise finished) before the runner picked it
        // up: terminal bookkeeping still happens here, exactly once.
        if execution.status.is_terminal() {
            self.finalize(&execution).await;
            return execution.status;
        }

        let definition: PipelineDefinition =
            match serde_json::from_value(execution.definition_snapshot.clone()) {
                Ok(definition) => definition,
                Err(error) => {
                    execution.mark_failed(format!("invalid definition snapshot: {error}"));
                    self.finalize(&execution).await;
                    return execution.status;
                }
            };

        execution.mark_running();
        self.persist_execution(&execution).await;
        self.events.try_emit(
            "execution.started",
            Some(json!({
                "execution_id": execution.execution_id,
                "pipeline_id": execution.pipeline_id,
                "trigger_type": execution.trigger_type,
            })),
        );

        match build_execution_graph(&definition) {
            Ok(graph) => {
                self.execute_graph(&graph, &mut execution, &token).await;
            }
            Err(AqueductError::CycleDetected(_)) => {
                execution.mark_failed("pipeline contains cycles");
            }
            Err(error) => {
                execution.mark_failed(error.to_string());
            }
        }

        self.finalize(&execution).await;
        execution.status
    }

    /// Runs the wave loop until every node has output, a node fails, the
    /// execution is cancelled, or no progress is possible.
    pub(crate) async fn execute_graph(
        &self,
        graph: &ExecutionGraph,
        execution: &mut PipelineExecution,
        token: &Arc<CancellationToken>,
    ) {
        let runner = NodeRunner::new(
            self.connectors.clone(),
            self.store.clone(),
            self.events.clone(),
        );

        let mut outputs: HashMap<usize, Value> = HashMap::new();
        let mut completed: HashSet<usize> = HashSet::new();
        let mut started: HashSet<usize> = HashSet::new();
        let mut waves = 0usize;

        while completed.len() < graph.node_count() {
            if self.cancellation_requested(execution, token).await {
                info!(
                    execution_id = %execution.execution_id,
                    reason = token.reason().unwrap_or_default(),
                    "execution cancelled, no further waves scheduled"
                );
                execution.mark_cancelled();
                return;
            }

            let ready = graph.ready_nodes(&completed, &started);
            if ready.is_empty() {
                let remaining: Vec<String> = (0..graph.node_count())
                    .filter(|idx| !completed.contains(idx))
                    .map(|idx| graph.node(idx).node_id.clone())
                    .collect();
                execution.mark_failed(AqueductError::Deadlocked { remaining }.to_string());
                return;
            }

            self.events.try_emit(
                "execution.wave",
                Some(json!({
                    "execution_id": execution.execution_id,
                    "wave": waves,
                    "nodes": ready
                        .iter()
                        .map(|&idx| graph.node(idx).node_id.clone())
                        .collect::<Vec<_>>(),
                })),
            );

            // Spawn the whole wave, then join all of it: a failure lets the
            // other in-flight nodes finish, but no later wave starts.
            let mut tasks = FuturesUnordered::new();
            for idx in ready {
                started.insert(idx);
                let inputs = gather_inputs(graph, idx, &outputs);
                let record =
                    NodeExecution::new(&execution.execution_id, &graph.node(idx).node_id);
                if let Err(error) = self.store.insert_node_execution(record.clone()).await {
                    warn!(error = %error, "failed to create node execution record");
                }
                let node = graph.node(idx).clone();
                let runner = runner.clone();
                tasks.push(tokio::spawn(async move {
                    let (record, result) = runner.execute(record, &node, inputs).await;
                    (idx, record, result)
                }));
            }

            let mut wave_error: Option<String> = None;
            while let Some(joined) = tasks.next().await {
                match joined {
                    Ok((idx, _record, Ok(output))) => {
                        outputs.insert(idx, output);
                        completed.insert(idx);
                    }
                    Ok((idx, _record, Err(error))) => {
                        if wave_error.is_none() {
                            wave_error = Some(format!(
                                "node '{}' failed: {error}",
                                graph.node(idx).node_id
                            ));
                        }
                    }
                    Err(join_error) => {
                        if wave_error.is_none() {
                            wave_error = Some(format!("node task panicked: {join_error}"));
                        }
                    }
                }
            }

            if let Some(error) = wave_error {
                execution.mark_failed(error);
                return;
            }

            waves += 1;
        }

        // A cancel that raced the last wave still wins over completion.
        if self.cancellation_requested(execution, token).await {
            execution.mark_cancelled();
            return;
        }

        execution.metrics = Some(json!({
            "nodes_executed": completed.len(),
            "waves": waves,
        }));
        execution.mark_completed(collect_output(graph, &outputs));
    }

    /// True when the token is tripped or the persisted record was flipped
    /// to cancelled by a collaborator.
    async fn cancellation_requested(
        &self,
        execution: &PipelineExecution,
        token: &Arc<CancellationToken>,
    ) -> bool {
        if token.is_cancelled() {
            return true;
        }
        matches!(
            self.store.execution(&execution.execution_id).await,
            Ok(Some(stored)) if stored.status == ExecutionStatus::Cancelled
        )
    }

    /// Terminal bookkeeping, run exactly once per execution: persist the
    /// record, emit the terminal event, evaluate alerts, and update the
    /// pipeline's last-execution pointer.
    async fn finalize(&self, execution: &PipelineExecution) {
        self.persist_execution(execution).await;

        let event = match execution.status {
            ExecutionStatus::Completed => "execution.completed",
            ExecutionStatus::Cancelled => "execution.cancelled",
            _ => "execution.failed",
        };
        self.events.try_emit(
            event,
            Some(json!({
                "execution_id": execution.execution_id,
                "pipeline_id": execution.pipeline_id,
                "status": execution.status,
                "duration_seconds": execution.duration_seconds,
                "error_message": execution.error_message,
            })),
        );

        let evaluator = AlertEvaluator::new(
            self.store.clone(),
            self.notifier.clone(),
            self.events.clone(),
        );
        if let Err(error) = evaluator.evaluate(execution).await {
            warn!(
                execution_id = %execution.execution_id,
                error = %error,
                "alert evaluation failed"
            );
        }

        match self.store.pipeline(&execution.pipeline_id).await {
            Ok(Some(mut pipeline)) => {
                pipeline.record_execution(&execution.execution_id);
                if let Err(error) = self.store.update_pipeline(pipeline).await {
                    warn!(error = %error, "failed to update pipeline execution pointer");
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!(error = %error, "failed to load pipeline for execution pointer");
            }
        }
    }

    async fn persist_execution(&self, execution: &PipelineExecution) {
        if let Err(error) = self.store.update_execution(execution.clone()).await {
            warn!(
                execution_id = %execution.execution_id,
                error = %error,
                "failed to persist execution"
            );
        }
    }
}

impl std::fmt::Debug for DagRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagRunner").finish()
    }
}

/// Merges the transformed outputs of a node's predecessors, keyed by
/// target port. Multiple edges landing on the same port concatenate.
fn gather_inputs(
    graph: &ExecutionGraph,
    idx: usize,
    outputs: &HashMap<usize, Value>,
) -> HashMap<String, Value> {
    let mut inputs: HashMap<String, Value> = HashMap::new();

    for &edge_idx in graph.incoming_edges(idx) {
        let edge = graph.edge(edge_idx);
        let Some(upstream) = outputs.get(&edge.source) else {
            continue;
        };
        let view = port_view(upstream, &edge.source_port);
        let delivered =
            deliver_edge_value(&view, edge.transformation.as_ref(), edge.condition.as_ref());

        match inputs.remove(&edge.target_port) {
            Some(existing) => {
                inputs.insert(edge.target_port.clone(), merge_port_values(&existing, &delivered));
            }
            None => {
                inputs.insert(edge.target_port.clone(), delivered);
            }
        }
    }

    inputs
}

/// Selects what an edge reads from its source: the whole output for the
/// default port, a named key of it otherwise (`valid_data`, ...).
fn port_view(output: &Value, source_port: &str) -> Value {
    if source_port == "output" {
        output.clone()
    } else {
        output.get(source_port).cloned().unwrap_or(Value::Null)
    }
}

fn merge_port_values(a: &Value, b: &Value) -> Value {
    let mut items = value_items(a);
    items.extend(value_items(b));
    let count = items.len();
    json!({"data": items, "record_count": count})
}

/// Aggregate output of a completed run: the outputs of nodes with no
/// outgoing edges, keyed by node id.
fn collect_output(graph: &ExecutionGraph, outputs: &HashMap<usize, Value>) -> Value {
    let mut aggregate = serde_json::Map::new();
    for idx in 0..graph.node_count() {
        if graph.outgoing_edges(idx).is_empty() {
            if let Some(output) = outputs.get(&idx) {
                aggregate.insert(graph.node(idx).node_id.clone(), output.clone());
            }
        }
    }
    Value::Object(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_execution_graph;
    use crate::model::{NodeKind, PipelineDefinition, PipelineEdge, PipelineNode};
    use serde_json::json;

    fn graph_for(definition: &PipelineDefinition) -> ExecutionGraph {
        build_execution_graph(definition).unwrap()
    }

    #[test]
    fn test_gather_inputs_applies_edge_transformation() {
        let def = PipelineDefinition::new()
            .with_node(PipelineNode::new("a", NodeKind::Splitter))
            .with_node(PipelineNode::new("b", NodeKind::Splitter))
            .with_edge(PipelineEdge::new("a", "b").with_transformation(json!({
                "type": "filter",
                "condition": {"field": "x", "operator": "greater_than", "value": 4}
            })));
        let graph = graph_for(&def);
        let a = graph.node_index("a").unwrap();
        let b = graph.node_index("b").unwrap();

        let outputs = HashMap::from([(a, json!({"data": [{"x": 1}, {"x": 5}, {"x": 9}]}))]);
        let inputs = gather_inputs(&graph, b, &outputs);
        assert_eq!(inputs["input"]["data"], json!([{"x": 5}, {"x": 9}]));
    }

    #[test]
    fn test_gather_inputs_selects_named_source_port() {
        let def = PipelineDefinition::new()
            .with_node(PipelineNode::new("v", NodeKind::Splitter))
            .with_node(PipelineNode::new("sink", NodeKind::Splitter))
            .with_edge(PipelineEdge {
                source: "v".to_string(),
                target: "sink".to_string(),
                source_port: "invalid_data".to_string(),
                target_port: "input".to_string(),
                transformation: None,
                condition: None,
                enabled: true,
            });
        let graph = graph_for(&def);
        let v = graph.node_index("v").unwrap();
        let sink = graph.node_index("sink").unwrap();

        let outputs = HashMap::from([(
            v,
            json!({"data": [], "invalid_data": [{"bad": true}]}),
        )]);
        let inputs = gather_inputs(&graph, sink, &outputs);
        assert_eq!(inputs["input"], json!([{"bad": true}]));
    }

    #[test]
    fn test_gather_inputs_merges_same_target_port() {
        let def = PipelineDefinition::new()
            .with_node(PipelineNode::new("a", NodeKind::Splitter))
            .with_node(PipelineNode::new("b", NodeKind::Splitter))
            .with_node(PipelineNode::new("j", NodeKind::Splitter))
            .with_edge(PipelineEdge::new("a", "j"))
            .with_edge(PipelineEdge::new("b", "j"));
        let graph = graph_for(&def);
        let a = graph.node_index("a").unwrap();
        let b = graph.node_index("b").unwrap();
        let j = graph.node_index("j").unwrap();

        let outputs = HashMap::from([
            (a, json!({"data": [{"id": 1}]})),
            (b, json!({"data": [{"id": 2}]})),
        ]);
        let inputs = gather_inputs(&graph, j, &outputs);
        assert_eq!(inputs["input"]["record_count"], json!(2));
    }

    #[test]
    fn test_collect_output_keyed_by_terminal_nodes() {
        let def = PipelineDefinition::new()
            .with_node(PipelineNode::new("a", NodeKind::Splitter))
            .with_node(PipelineNode::new("b", NodeKind::Splitter))
            .with_edge(PipelineEdge::new("a", "b"));
        let graph = graph_for(&def);
        let a = graph.node_index("a").unwrap();
        let b = graph.node_index("b").unwrap();

        let outputs = HashMap::from([
            (a, json!({"data": [1]})),
            (b, json!({"data": [1, 2]})),
        ]);
        let aggregate = collect_output(&graph, &outputs);
        assert!(aggregate.get("b").is_some());
        assert!(aggregate.get("a").is_none());
    }
}
