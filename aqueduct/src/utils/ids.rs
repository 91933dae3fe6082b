//! Prefixed identifier generation for executions and records.

use uuid::Uuid;

/// Generates a globally unique pipeline execution id.
#[must_use]
pub fn execution_id() -> String {
    format!("exec_{}", Uuid::new_v4().simple())
}

/// Generates an execution-scoped node execution id.
#[must_use]
pub fn node_execution_id() -> String {
    format!("nexec_{}", Uuid::new_v4().simple())
}

/// Generates a generic record id with the given prefix.
#[must_use]
pub fn record_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
