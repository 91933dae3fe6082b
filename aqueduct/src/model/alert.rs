//! Alert records evaluated after each terminal execution.

use super::{ExecutionStatus, PipelineExecution};
use crate::utils::{now_utc, record_id, Timestamp};
use serde::{Deserialize, Serialize};

/// The condition under which an alert fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertCondition {
    /// Fires when the execution failed.
    ExecutionFailure,
    /// Fires when the execution took longer than the threshold.
    ExecutionDuration {
        /// Duration threshold in seconds.
        threshold_seconds: f64,
    },
    /// Extension point for a future quality metric. Never fires.
    DataQuality,
}

impl AlertCondition {
    /// Returns true if the condition matches the terminal execution.
    #[must_use]
    pub fn matches(&self, execution: &PipelineExecution) -> bool {
        match self {
            Self::ExecutionFailure => execution.status == ExecutionStatus::Failed,
            Self::ExecutionDuration { threshold_seconds } => execution
                .duration_seconds
                .is_some_and(|duration| duration > *threshold_seconds),
            // No quality metric is defined yet; see DESIGN.md.
            Self::DataQuality => false,
        }
    }
}

/// Where a triggered alert is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum NotificationTarget {
    /// Email delivery.
    Email {
        /// Recipient address.
        address: String,
    },
    /// Webhook delivery.
    Webhook {
        /// Destination URL.
        url: String,
    },
}

/// A configured alert for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineAlert {
    /// Alert id.
    pub id: String,
    /// Owning pipeline id.
    pub pipeline_id: String,
    /// Human-readable name.
    pub name: String,
    /// The trigger condition.
    pub condition: AlertCondition,
    /// Delivery targets.
    pub targets: Vec<NotificationTarget>,
    /// Disabled alerts are skipped by the evaluator.
    pub enabled: bool,
    /// When the alert last fired.
    #[serde(default)]
    pub last_triggered_at: Option<Timestamp>,
    /// How many times the alert has fired.
    pub trigger_count: u64,
    /// Creation time.
    pub created_at: Timestamp,
}

impl PipelineAlert {
    /// Creates an enabled alert with no targets.
    #[must_use]
    pub fn new(
        pipeline_id: impl Into<String>,
        name: impl Into<String>,
        condition: AlertCondition,
    ) -> Self {
        Self {
            id: record_id("alert"),
            pipeline_id: pipeline_id.into(),
            name: name.into(),
            condition,
            targets: Vec::new(),
            enabled: true,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: now_utc(),
        }
    }

    /// Adds a delivery target.
    #[must_use]
    pub fn with_target(mut self, target: NotificationTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Disables the alert.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Records one firing.
    pub fn record_trigger(&mut self) {
        self.last_triggered_at = Some(now_utc());
        self.trigger_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pipeline, PipelineDefinition, TriggerType};
    use serde_json::json;

    fn terminal_execution(fail: bool) -> PipelineExecution {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let mut exec = PipelineExecution::new(&pipeline, TriggerType::Manual);
        exec.mark_running();
        if fail {
            exec.mark_failed("boom");
        } else {
            exec.mark_completed(json!({}));
        }
        exec
    }

    #[test]
    fn test_execution_failure_condition() {
        let cond = AlertCondition::ExecutionFailure;
        assert!(cond.matches(&terminal_execution(true)));
        assert!(!cond.matches(&terminal_execution(false)));
    }

    #[test]
    fn test_duration_condition() {
        let mut exec = terminal_execution(false);
        exec.duration_seconds = Some(12.5);
        assert!(AlertCondition::ExecutionDuration {
            threshold_seconds: 10.0
        }
        .matches(&exec));
        assert!(!AlertCondition::ExecutionDuration {
            threshold_seconds: 60.0
        }
        .matches(&exec));
    }

    #[test]
    fn test_data_quality_never_fires() {
        assert!(!AlertCondition::DataQuality.matches(&terminal_execution(true)));
        assert!(!AlertCondition::DataQuality.matches(&terminal_execution(false)));
    }

    #[test]
    fn test_record_trigger() {
        let mut alert = PipelineAlert::new("p1", "failures", AlertCondition::ExecutionFailure);
        assert_eq!(alert.trigger_count, 0);
        alert.record_trigger();
        alert.record_trigger();
        assert_eq!(alert.trigger_count, 2);
        assert!(alert.last_triggered_at.is_some());
    }

    #[test]
    fn test_condition_serde_tags() {
        let cond: AlertCondition = serde_json::from_value(json!({
            "type": "execution_duration",
            "threshold_seconds": 30.0
        }))
        .unwrap();
        assert!(matches!(cond, AlertCondition::ExecutionDuration { .. }));
    }
}
