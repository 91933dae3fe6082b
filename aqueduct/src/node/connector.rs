//! External source/sink seams.
//!
//! Actual database/API/file access lives outside the engine. Extractors
//! and loaders reach it through connectors registered here by name.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by connector implementations.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConnectorError(pub String);

impl From<String> for ConnectorError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ConnectorError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// A readable external source.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetches records according to the connector-specific options.
    async fn fetch(&self, options: &Value) -> Result<Vec<Value>, ConnectorError>;
}

/// A writable external sink.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Writes records, returning how many were accepted.
    async fn write(&self, records: &[Value], options: &Value) -> Result<u64, ConnectorError>;
}

/// Named registry of source and sink connectors.
#[derive(Default)]
pub struct ConnectorRegistry {
    sources: RwLock<HashMap<String, Arc<dyn SourceConnector>>>,
    sinks: RwLock<HashMap<String, Arc<dyn SinkConnector>>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source under a name, replacing any previous entry.
    pub fn register_source(&self, name: impl Into<String>, source: Arc<dyn SourceConnector>) {
        self.sources.write().insert(name.into(), source);
    }

    /// Registers a sink under a name, replacing any previous entry.
    pub fn register_sink(&self, name: impl Into<String>, sink: Arc<dyn SinkConnector>) {
        self.sinks.write().insert(name.into(), sink);
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<Arc<dyn SourceConnector>> {
        self.sources.read().get(name).cloned()
    }

    /// Looks up a sink by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<Arc<dyn SinkConnector>> {
        self.sinks.read().get(name).cloned()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("sources", &self.sources.read().len())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

/// A source that returns a fixed record set on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<Value>,
}

impl StaticSource {
    /// Creates a source serving the given records.
    #[must_use]
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SourceConnector for StaticSource {
    async fn fetch(&self, _options: &Value) -> Result<Vec<Value>, ConnectorError> {
        Ok(self.records.clone())
    }
}

/// A sink that keeps everything written to it in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    written: parking_lot::Mutex<Vec<Value>>,
}

impl CollectingSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far.
    #[must_use]
    pub fn written(&self) -> Vec<Value> {
        self.written.lock().clone()
    }

    /// Number of records written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.written.lock().len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.lock().is_empty()
    }
}

#[async_trait]
impl SinkConnector for CollectingSink {
    async fn write(&self, records: &[Value], _options: &Value) -> Result<u64, ConnectorError> {
        self.written.lock().extend_from_slice(records);
        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_source_serves_records() {
        let source = StaticSource::new(vec![json!({"x": 1}), json!({"x": 2})]);
        let records = source.fetch(&Value::Null).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_collecting_sink_accumulates() {
        let sink = CollectingSink::new();
        let count = sink.write(&[json!(1), json!(2)], &Value::Null).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ConnectorRegistry::new();
        registry.register_source("orders", Arc::new(StaticSource::default()));
        assert!(registry.source("orders").is_some());
        assert!(registry.source("missing").is_none());
        assert!(registry.sink("orders").is_none());
    }
}
