//! Connector doubles and definition fixtures for tests.

use crate::model::{NodeKind, PipelineDefinition, PipelineEdge, PipelineNode};
use crate::node::{ConnectorError, SourceConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source that fails a configurable number of times before succeeding.
#[derive(Debug, Default)]
pub struct FailingSource {
    fail_times: Option<usize>,
    calls: AtomicUsize,
    records: Vec<Value>,
}

impl FailingSource {
    /// A source that fails on every fetch.
    #[must_use]
    pub fn always() -> Self {
        Self {
            fail_times: None,
            calls: AtomicUsize::new(0),
            records: Vec::new(),
        }
    }

    /// A source that fails `n` times, then serves `records`.
    #[must_use]
    pub fn failing_times(n: usize, records: Vec<Value>) -> Self {
        Self {
            fail_times: Some(n),
            calls: AtomicUsize::new(0),
            records,
        }
    }

    /// Number of fetches observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for FailingSource {
    async fn fetch(&self, _options: &Value) -> Result<Vec<Value>, ConnectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_times {
            None => Err(ConnectorError::from("synthetic source failure")),
            Some(n) if call <= n => Err(ConnectorError::from(format!(
                "synthetic source failure on call {call}"
            ))),
            Some(_) => Ok(self.records.clone()),
        }
    }
}

/// A source that sleeps before serving its records.
#[derive(Debug)]
pub struct SlowSource {
    delay_seconds: f64,
    records: Vec<Value>,
}

impl SlowSource {
    /// Creates a source that sleeps `delay_seconds` per fetch.
    #[must_use]
    pub fn new(delay_seconds: f64, records: Vec<Value>) -> Self {
        Self {
            delay_seconds,
            records,
        }
    }
}

#[async_trait]
impl SourceConnector for SlowSource {
    async fn fetch(&self, _options: &Value) -> Result<Vec<Value>, ConnectorError> {
        tokio::time::sleep(Duration::from_secs_f64(self.delay_seconds)).await;
        Ok(self.records.clone())
    }
}

/// A source that logs `start:<name>`/`end:<name>` markers around each
/// fetch, for ordering assertions.
#[derive(Debug)]
pub struct RecordingSource {
    name: String,
    delay_seconds: f64,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingSource {
    /// Creates a recording source writing to the shared log.
    #[must_use]
    pub fn new(name: impl Into<String>, delay_seconds: f64, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            delay_seconds,
            log,
        }
    }
}

#[async_trait]
impl SourceConnector for RecordingSource {
    async fn fetch(&self, _options: &Value) -> Result<Vec<Value>, ConnectorError> {
        self.log.lock().push(format!("start:{}", self.name));
        tokio::time::sleep(Duration::from_secs_f64(self.delay_seconds)).await;
        self.log.lock().push(format!("end:{}", self.name));
        Ok(vec![json!({"from": self.name})])
    }
}

/// An extractor node reading from the named connector.
#[must_use]
pub fn extractor(id: &str, connector: &str) -> PipelineNode {
    PipelineNode::new(id, NodeKind::Extractor).with_config(json!({
        "source": {"type": "database", "connector": connector}
    }))
}

/// A two-node chain: `extract` -> `pass`.
#[must_use]
pub fn linear_definition(connector: &str) -> PipelineDefinition {
    PipelineDefinition::new()
        .with_node(extractor("extract", connector))
        .with_node(PipelineNode::new("pass", NodeKind::Splitter))
        .with_edge(PipelineEdge::new("extract", "pass"))
}

/// The diamond a -> {b, c} -> d, every node an extractor on its own
/// connector name (`a`, `b`, `c`, `d`).
#[must_use]
pub fn diamond_definition() -> PipelineDefinition {
    PipelineDefinition::new()
        .with_node(extractor("a", "a"))
        .with_node(extractor("b", "b"))
        .with_node(extractor("c", "c"))
        .with_node(extractor("d", "d"))
        .with_edge(PipelineEdge::new("a", "b"))
        .with_edge(PipelineEdge::new("a", "c"))
        .with_edge(PipelineEdge::new("b", "d"))
        .with_edge(PipelineEdge::new("c", "d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_source_recovers_after_n() {
        let source = FailingSource::failing_times(2, vec![json!(1)]);
        assert!(source.fetch(&Value::Null).await.is_err());
        assert!(source.fetch(&Value::Null).await.is_err());
        assert!(source.fetch(&Value::Null).await.is_ok());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_recording_source_brackets_fetch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = RecordingSource::new("x", 0.0, log.clone());
        source.fetch(&Value::Null).await.unwrap();
        assert_eq!(*log.lock(), vec!["start:x", "end:x"]);
    }

    #[test]
    fn test_diamond_definition_shape() {
        let def = diamond_definition();
        assert_eq!(def.nodes.len(), 4);
        assert_eq!(def.edges.len(), 4);
    }
}
