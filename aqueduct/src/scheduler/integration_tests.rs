//! End-to-end scheduler behavior over in-memory collaborators.

#[cfg(test)]
mod tests {
    use crate::alert::CollectingNotifier;
    use crate::cancellation::CancellationToken;
    use crate::events::CollectingEventSink;
    use crate::graph::ExecutionGraph;
    use crate::model::{
        AlertCondition, ExecutionStatus, NodeKind, NodeRunStatus, NotificationTarget, Pipeline,
        PipelineAlert, PipelineDefinition, PipelineEdge, PipelineExecution, PipelineNode,
        TriggerType,
    };
    use crate::node::{CollectingSink, ConnectorRegistry, NodeConfig, StaticSource};
    use crate::scheduler::DagRunner;
    use crate::store::{InMemoryStore, PipelineStore};
    use crate::testing::{
        diamond_definition, extractor, FailingSource, RecordingSource, SlowSource,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        connectors: Arc<ConnectorRegistry>,
        events: Arc<CollectingEventSink>,
        notifier: Arc<CollectingNotifier>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                connectors: Arc::new(ConnectorRegistry::new()),
                events: Arc::new(CollectingEventSink::new()),
                notifier: Arc::new(CollectingNotifier::new()),
            }
        }

        fn runner(&self) -> DagRunner {
            DagRunner::new(
                self.store.clone(),
                self.connectors.clone(),
                self.events.clone(),
                self.notifier.clone(),
            )
        }

        async fn submit(&self, definition: PipelineDefinition) -> (Pipeline, PipelineExecution) {
            let pipeline = Pipeline::new("test", definition);
            self.store.insert_pipeline(pipeline.clone()).await.unwrap();
            let execution = PipelineExecution::new(&pipeline, TriggerType::Manual);
            self.store.insert_execution(execution.clone()).await.unwrap();
            (pipeline, execution)
        }
    }

    #[tokio::test]
    async fn test_linear_pipeline_runs_every_node_once() {
        let harness = Harness::new();
        harness
            .connectors
            .register_source("src", Arc::new(StaticSource::new(vec![json!({"x": 1})])));

        let def = crate::testing::linear_definition("src");
        let (_, execution) = harness.submit(def).await;

        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Completed);

        let records = harness
            .store
            .node_executions(&execution.execution_id)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.status == NodeRunStatus::Completed && r.attempt == 1));

        let stored = harness
            .store
            .execution(&execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert!(stored.duration_seconds.is_some());
        assert!(stored.output.is_some());
    }

    #[tokio::test]
    async fn test_disabled_node_is_not_executed() {
        let harness = Harness::new();
        harness
            .connectors
            .register_source("src", Arc::new(StaticSource::new(Vec::new())));

        let def = PipelineDefinition::new()
            .with_node(extractor("keep", "src"))
            .with_node(extractor("skip", "src").disabled());
        let (_, execution) = harness.submit(def).await;

        harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;

        let records = harness
            .store
            .node_executions(&execution.execution_id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_id, "keep");
    }

    #[tokio::test]
    async fn test_diamond_wave_ordering() {
        let harness = Harness::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c", "d"] {
            harness.connectors.register_source(
                name,
                Arc::new(RecordingSource::new(name, 0.05, log.clone())),
            );
        }

        let (_, execution) = harness.submit(diamond_definition()).await;
        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Completed);

        let log = log.lock().clone();
        let pos = |marker: &str| log.iter().position(|m| m == marker).unwrap();

        // d starts only after both b and c have finished.
        assert!(pos("start:d") > pos("end:b"));
        assert!(pos("start:d") > pos("end:c"));
        // b and c overlap: both start before either ends.
        assert!(pos("start:b") < pos("end:c"));
        assert!(pos("start:c") < pos("end:b"));
    }

    #[tokio::test]
    async fn test_failing_node_fails_execution_after_retries() {
        let harness = Harness::new();
        let source = Arc::new(FailingSource::always());
        harness.connectors.register_source("flaky", source.clone());

        let def = PipelineDefinition::new()
            .with_node(extractor("flaky_node", "flaky").with_retries(2, 0.0));
        let (_, execution) = harness.submit(def).await;

        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Failed);

        // 1 initial + 2 retries.
        assert_eq!(source.calls(), 3);

        let stored = harness
            .store
            .execution(&execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("flaky_node")));

        let records = harness
            .store
            .node_executions(&execution.execution_id)
            .await
            .unwrap();
        assert_eq!(records[0].attempt, 3);
        assert_eq!(records[0].status, NodeRunStatus::Failed);
    }

    #[tokio::test]
    async fn test_wave_failure_lets_inflight_nodes_finish_but_stops_scheduling() {
        let harness = Harness::new();
        harness
            .connectors
            .register_source("bad", Arc::new(FailingSource::always()));
        harness.connectors.register_source(
            "slow",
            Arc::new(SlowSource::new(0.1, vec![json!({"x": 1})])),
        );

        // bad and slow_ok share wave 0; downstream depends on slow_ok.
        let def = PipelineDefinition::new()
            .with_node(extractor("bad_node", "bad"))
            .with_node(extractor("slow_ok", "slow"))
            .with_node(PipelineNode::new("downstream", NodeKind::Splitter))
            .with_edge(PipelineEdge::new("slow_ok", "downstream"));
        let (_, execution) = harness.submit(def).await;

        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Failed);

        let records = harness
            .store
            .node_executions(&execution.execution_id)
            .await
            .unwrap();
        let by_id = |id: &str| records.iter().find(|r| r.node_id == id);

        // The in-flight sibling ran to completion.
        assert_eq!(by_id("slow_ok").unwrap().status, NodeRunStatus::Completed);
        // No wave after the failed one.
        assert!(by_id("downstream").is_none());
    }

    #[tokio::test]
    async fn test_deadlocked_graph_fails_execution() {
        use crate::graph::{GraphEdge, GraphNode};

        let harness = Harness::new();
        let nodes = vec![
            GraphNode {
                node_id: "x".to_string(),
                kind: NodeKind::Splitter,
                config: NodeConfig::Splitter,
                timeout_seconds: 1.0,
                retry_attempts: 0,
                retry_delay_seconds: 0.0,
            },
            GraphNode {
                node_id: "y".to_string(),
                kind: NodeKind::Splitter,
                config: NodeConfig::Splitter,
                timeout_seconds: 1.0,
                retry_attempts: 0,
                retry_delay_seconds: 0.0,
            },
        ];
        let edges = vec![
            GraphEdge {
                source: 0,
                target: 1,
                source_port: "output".to_string(),
                target_port: "input".to_string(),
                transformation: None,
                condition: None,
            },
            GraphEdge {
                source: 1,
                target: 0,
                source_port: "output".to_string(),
                target_port: "input".to_string(),
                transformation: None,
                condition: None,
            },
        ];
        let corrupt = ExecutionGraph::from_parts(nodes, edges);

        let (pipeline, _) = harness.submit(PipelineDefinition::new()).await;
        let mut execution = PipelineExecution::new(&pipeline, TriggerType::Manual);
        harness
            .store
            .insert_execution(execution.clone())
            .await
            .unwrap();
        execution.mark_running();

        harness
            .runner()
            .execute_graph(&corrupt, &mut execution, &CancellationToken::new())
            .await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("deadlocked")));
    }

    #[tokio::test]
    async fn test_cancellation_stops_future_waves() {
        let harness = Harness::new();
        harness.connectors.register_source(
            "slow",
            Arc::new(SlowSource::new(0.2, vec![json!({"x": 1})])),
        );

        let def = PipelineDefinition::new()
            .with_node(extractor("first", "slow"))
            .with_node(PipelineNode::new("second", NodeKind::Splitter))
            .with_edge(PipelineEdge::new("first", "second"));
        let (_, execution) = harness.submit(def).await;

        let token = CancellationToken::new();
        let runner = harness.runner();
        let execution_id = execution.execution_id.clone();
        let handle = tokio::spawn(async move { runner.run(&execution_id, token).await });

        // Let wave 0 start, then cancel while `first` is still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = harness
            .store
            .execution(&execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);

        // Cancel through the persisted record, like a collaborator would.
        let mut cancelled = stored;
        cancelled.mark_cancelled();
        harness.store.update_execution(cancelled).await.unwrap();

        let status = handle.await.unwrap();
        assert_eq!(status, ExecutionStatus::Cancelled);

        let records = harness
            .store
            .node_executions(&execution.execution_id)
            .await
            .unwrap();
        // The in-flight node finished naturally; the next wave never ran.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_id, "first");
        assert_eq!(records[0].status, NodeRunStatus::Completed);
    }

    #[tokio::test]
    async fn test_terminal_execution_evaluates_alerts_once() {
        let harness = Harness::new();
        harness
            .connectors
            .register_source("bad", Arc::new(FailingSource::always()));

        let def = PipelineDefinition::new().with_node(extractor("only", "bad"));
        let (pipeline, execution) = harness.submit(def).await;

        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure)
            .with_target(NotificationTarget::Email {
                address: "ops@example.com".to_string(),
            });
        harness.store.insert_alert(alert).await.unwrap();

        harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;

        assert_eq!(harness.notifier.len(), 1);
        let alerts = harness.store.alerts_for_pipeline(&pipeline.id).await.unwrap();
        assert_eq!(alerts[0].trigger_count, 1);
        assert_eq!(harness.events.events_of_type("execution.failed").len(), 1);
        assert_eq!(harness.events.events_of_type("alert.triggered").len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_execution_updates_pipeline_pointer() {
        let harness = Harness::new();
        harness
            .connectors
            .register_source("src", Arc::new(StaticSource::new(Vec::new())));

        let def = PipelineDefinition::new().with_node(extractor("only", "src"));
        let (pipeline, execution) = harness.submit(def).await;

        harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;

        let stored = harness.store.pipeline(&pipeline.id).await.unwrap().unwrap();
        assert_eq!(
            stored.last_execution_id.as_deref(),
            Some(execution.execution_id.as_str())
        );
        assert!(stored.last_execution_at.is_some());
    }

    #[tokio::test]
    async fn test_validator_routing_delivers_only_valid_records_downstream() {
        let harness = Harness::new();
        harness.connectors.register_source(
            "users",
            Arc::new(StaticSource::new(vec![
                json!({"email": "x@y.com"}),
                json!({"name": "no-email"}),
            ])),
        );
        let sink = Arc::new(CollectingSink::new());
        harness.connectors.register_sink("warehouse", sink.clone());

        let def = PipelineDefinition::new()
            .with_node(extractor("extract", "users"))
            .with_node(
                PipelineNode::new("check", NodeKind::Validator).with_config(json!({
                    "validation_rules": [{"type": "required", "field": "email"}]
                })),
            )
            .with_node(
                PipelineNode::new("load", NodeKind::Loader).with_config(json!({
                    "sink": {"type": "database", "connector": "warehouse"}
                })),
            )
            .with_edge(PipelineEdge::new("extract", "check"))
            .with_edge(PipelineEdge {
                source: "check".to_string(),
                target: "load".to_string(),
                source_port: "valid_data".to_string(),
                target_port: "input".to_string(),
                transformation: None,
                condition: None,
                enabled: true,
            });
        let (_, execution) = harness.submit(def).await;

        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Completed);

        assert_eq!(sink.written(), vec![json!({"email": "x@y.com"})]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_still_finalizes_once() {
        let harness = Harness::new();
        let def = PipelineDefinition::new().with_node(extractor("only", "src"));
        let (_, mut execution) = harness.submit(def).await;

        execution.mark_cancelled();
        harness
            .store
            .update_execution(execution.clone())
            .await
            .unwrap();

        let status = harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;
        assert_eq!(status, ExecutionStatus::Cancelled);
        assert_eq!(harness.events.events_of_type("execution.cancelled").len(), 1);
        assert!(harness.events.events_of_type("execution.started").is_empty());
    }

    #[tokio::test]
    async fn test_wave_events_describe_breadth_first_rounds() {
        let harness = Harness::new();
        for name in ["a", "b", "c", "d"] {
            harness
                .connectors
                .register_source(name, Arc::new(StaticSource::new(vec![json!({"x": 1})])));
        }

        let (_, execution) = harness.submit(diamond_definition()).await;
        harness
            .runner()
            .run(&execution.execution_id, CancellationToken::new())
            .await;

        let waves = harness.events.events_of_type("execution.wave");
        assert_eq!(waves.len(), 3);
        let wave_nodes = |i: usize| {
            waves[i]
                .1
                .as_ref()
                .unwrap()
                .get("nodes")
                .unwrap()
                .as_array()
                .unwrap()
                .len()
        };
        assert_eq!(wave_nodes(0), 1);
        assert_eq!(wave_nodes(1), 2);
        assert_eq!(wave_nodes(2), 1);
    }
}
