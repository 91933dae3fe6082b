//! # Aqueduct
//!
//! A data pipeline orchestration engine with wave-parallel DAG execution.
//!
//! Pipelines are named, versioned DAGs of typed nodes (extract, transform,
//! load, validate, aggregate, branch) joined by edges that can filter,
//! reshape or gate the data they carry. Aqueduct provides:
//!
//! - **Definition validation**: structural checks and cycle detection
//!   before a pipeline can run
//! - **Wave-parallel scheduling**: every node whose dependencies are
//!   satisfied runs concurrently; waves are fully joined before the next
//! - **Per-node resilience**: timeouts and fixed-delay retries, recorded
//!   attempt by attempt
//! - **Cooperative cancellation**: stop scheduling without tearing down
//!   in-flight work
//! - **Alerting**: failure/duration conditions with pluggable delivery
//!
//! Persistence, external sources/sinks and notification transport are
//! collaborator traits; in-memory implementations ship for embedding and
//! tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aqueduct::prelude::*;
//!
//! let service = PipelineService::new(store).with_connectors(connectors);
//! let pipeline = service.create_pipeline("orders-etl", definition).await?;
//! let handle = service
//!     .execute_pipeline(&pipeline.id, TriggerType::Manual, None, None, None)
//!     .await?;
//! let execution = service.execution(&handle.execution_id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod alert;
pub mod cancellation;
pub mod condition;
pub mod edge;
pub mod errors;
pub mod events;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod node;
pub mod observability;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alert::{AlertEvaluator, CollectingNotifier, LoggingNotifier, Notifier};
    pub use crate::cancellation::CancellationToken;
    pub use crate::condition::{Condition, ConditionOperator};
    pub use crate::edge::{transform_edge_value, EdgeTransformation};
    pub use crate::errors::{AqueductError, CycleDetectedError, DefinitionError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{build_execution_graph, validate_definition, ExecutionGraph};
    pub use crate::metrics::{compute_metrics, PipelineMetrics};
    pub use crate::model::{
        AlertCondition, ExecutionStatus, NodeExecution, NodeKind, NodeRunStatus,
        NotificationTarget, Pipeline, PipelineAlert, PipelineDefinition, PipelineEdge,
        PipelineExecution, PipelineNode, PipelineStatus, TriggerType,
    };
    pub use crate::node::{
        ConnectorRegistry, NodeConfig, NodeRunner, SinkConnector, SourceConnector,
    };
    pub use crate::scheduler::DagRunner;
    pub use crate::service::{ExecutionHandle, PipelineService};
    pub use crate::store::{InMemoryStore, PipelineStore};
    pub use crate::utils::{iso_timestamp, now_utc, Timestamp};
}
