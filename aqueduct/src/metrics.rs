//! Execution metrics over a time window.

use crate::model::{ExecutionStatus, PipelineExecution};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Aggregate execution statistics for one pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Executions created inside the window.
    pub total_executions: u64,
    /// Completed executions.
    pub successful_executions: u64,
    /// Failed executions.
    pub failed_executions: u64,
    /// `successful / total * 100`; zero when the window is empty.
    pub success_rate_percent: f64,
    /// Mean duration of executions that finished.
    pub average_duration_seconds: Option<f64>,
    /// Shortest finished execution.
    pub min_duration_seconds: Option<f64>,
    /// Longest finished execution.
    pub max_duration_seconds: Option<f64>,
}

/// Computes metrics over the executions created in `[start, end]`.
#[must_use]
pub fn compute_metrics(
    executions: &[PipelineExecution],
    start: Timestamp,
    end: Timestamp,
) -> PipelineMetrics {
    let in_window: Vec<&PipelineExecution> = executions
        .iter()
        .filter(|e| e.created_at >= start && e.created_at <= end)
        .collect();

    let total = in_window.len() as u64;
    let successful = in_window
        .iter()
        .filter(|e| e.status == ExecutionStatus::Completed)
        .count() as u64;
    let failed = in_window
        .iter()
        .filter(|e| e.status == ExecutionStatus::Failed)
        .count() as u64;

    let durations: Vec<f64> = in_window.iter().filter_map(|e| e.duration_seconds).collect();
    let average = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };
    let min = durations.iter().copied().fold(None::<f64>, |acc, d| {
        Some(acc.map_or(d, |a| a.min(d)))
    });
    let max = durations.iter().copied().fold(None::<f64>, |acc, d| {
        Some(acc.map_or(d, |a| a.max(d)))
    });

    PipelineMetrics {
        total_executions: total,
        successful_executions: successful,
        failed_executions: failed,
        success_rate_percent: if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        },
        average_duration_seconds: average,
        min_duration_seconds: min,
        max_duration_seconds: max,
    }
}
