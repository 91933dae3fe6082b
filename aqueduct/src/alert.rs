//! Post-run alert evaluation and notification dispatch.

use crate::errors::AqueductError;
use crate::events::EventSink;
use crate::model::{NotificationTarget, PipelineAlert, PipelineExecution};
use crate::store::PipelineStore;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Error returned by notifier implementations.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

impl From<String> for NotifyError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Delivery seam for triggered alerts. Actual email/webhook transport
/// lives outside the engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification for a triggered alert.
    async fn notify(
        &self,
        target: &NotificationTarget,
        alert: &PipelineAlert,
        execution: &PipelineExecution,
    ) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them. The default notifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(
        &self,
        target: &NotificationTarget,
        alert: &PipelineAlert,
        execution: &PipelineExecution,
    ) -> Result<(), NotifyError> {
        info!(
            alert = %alert.name,
            execution_id = %execution.execution_id,
            target = ?target,
            "alert notification"
        );
        Ok(())
    }
}

/// Collects notifications in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    delivered: parking_lot::Mutex<Vec<(String, NotificationTarget)>>,
}

impl CollectingNotifier {
    /// Creates an empty collecting notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alert-id/target pairs delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<(String, NotificationTarget)> {
        self.delivered.lock().clone()
    }

    /// Number of deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delivered.lock().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.lock().is_empty()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(
        &self,
        target: &NotificationTarget,
        alert: &PipelineAlert,
        _execution: &PipelineExecution,
    ) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .push((alert.id.clone(), target.clone()));
        Ok(())
    }
}

/// Delivers webhook targets over HTTP. Email targets are skipped.
#[cfg(feature = "webhook")]
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

#[cfg(feature = "webhook")]
impl WebhookNotifier {
    /// Creates a notifier with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        target: &NotificationTarget,
        alert: &PipelineAlert,
        execution: &PipelineExecution,
    ) -> Result<(), NotifyError> {
        let NotificationTarget::Webhook { url } = target else {
            return Ok(());
        };
        let body = serde_json::json!({
            "alert_id": alert.id,
            "alert_name": alert.name,
            "pipeline_id": execution.pipeline_id,
            "execution_id": execution.execution_id,
            "status": execution.status,
            "error_message": execution.error_message,
            "duration_seconds": execution.duration_seconds,
        });
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}

/// Evaluates a pipeline's alerts against one terminal execution.
///
/// Invoked exactly once per terminal execution, by the scheduler. Notifier
/// failures are logged and swallowed; they never affect execution state.
pub struct AlertEvaluator {
    store: Arc<dyn PipelineStore>,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
}

impl AlertEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        store: Arc<dyn PipelineStore>,
        notifier: Arc<dyn Notifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            notifier,
            events,
        }
    }

    /// Checks every enabled alert of the execution's pipeline, dispatching
    /// notifications and updating trigger bookkeeping for matches.
    pub async fn evaluate(&self, execution: &PipelineExecution) -> Result<(), AqueductError> {
        let alerts = self
            .store
            .alerts_for_pipeline(&execution.pipeline_id)
            .await?;

        for mut alert in alerts {
            if !alert.enabled || !alert.condition.matches(execution) {
                continue;
            }

            for target in alert.targets.clone() {
                if let Err(error) = self.notifier.notify(&target, &alert, execution).await {
                    warn!(
                        alert = %alert.name,
                        execution_id = %execution.execution_id,
                        error = %error,
                        "alert notification failed"
                    );
                }
            }

            alert.record_trigger();
            self.events.try_emit(
                "alert.triggered",
                Some(serde_json::json!({
                    "alert_id": alert.id,
                    "alert_name": alert.name,
                    "execution_id": execution.execution_id,
                    "trigger_count": alert.trigger_count,
                })),
            );
            self.store.update_alert(alert).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for AlertEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEvaluator").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::model::{
        AlertCondition, Pipeline, PipelineDefinition, TriggerType,
    };
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn failed_execution(pipeline: &Pipeline) -> PipelineExecution {
        let mut exec = PipelineExecution::new(pipeline, TriggerType::Manual);
        exec.mark_running();
        exec.mark_failed("boom");
        exec
    }

    async fn evaluator_with_alert(
        alert: PipelineAlert,
    ) -> (AlertEvaluator, Arc<InMemoryStore>, Arc<CollectingNotifier>) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_alert(alert).await.unwrap();
        let notifier = Arc::new(CollectingNotifier::new());
        let evaluator = AlertEvaluator::new(
            store.clone(),
            notifier.clone(),
            Arc::new(NoOpEventSink),
        );
        (evaluator, store, notifier)
    }

    #[tokio::test]
    async fn test_failure_alert_fires_and_updates_bookkeeping() {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure)
            .with_target(NotificationTarget::Email {
                address: "ops@example.com".to_string(),
            });
        let (evaluator, store, notifier) = evaluator_with_alert(alert).await;

        evaluator.evaluate(&failed_execution(&pipeline)).await.unwrap();

        assert_eq!(notifier.len(), 1);
        let stored = store.alerts_for_pipeline(&pipeline.id).await.unwrap();
        assert_eq!(stored[0].trigger_count, 1);
        assert!(stored[0].last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_disabled_alert_is_skipped() {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure)
            .with_target(NotificationTarget::Email {
                address: "ops@example.com".to_string(),
            })
            .disabled();
        let (evaluator, store, notifier) = evaluator_with_alert(alert).await;

        evaluator.evaluate(&failed_execution(&pipeline)).await.unwrap();

        assert!(notifier.is_empty());
        let stored = store.alerts_for_pipeline(&pipeline.id).await.unwrap();
        assert_eq!(stored[0].trigger_count, 0);
    }

    #[tokio::test]
    async fn test_non_matching_condition_does_not_fire() {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure);
        let (evaluator, _, notifier) = evaluator_with_alert(alert).await;

        let mut exec = PipelineExecution::new(&pipeline, TriggerType::Manual);
        exec.mark_running();
        exec.mark_completed(json!({}));
        evaluator.evaluate(&exec).await.unwrap();

        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_every_target_is_notified() {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure)
            .with_target(NotificationTarget::Email {
                address: "ops@example.com".to_string(),
            })
            .with_target(NotificationTarget::Webhook {
                url: "https://hooks.example.com/alerts".to_string(),
            });
        let (evaluator, _, notifier) = evaluator_with_alert(alert).await;

        evaluator.evaluate(&failed_execution(&pipeline)).await.unwrap();
        assert_eq!(notifier.len(), 2);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_abort_evaluation() {
        let pipeline = Pipeline::new("etl", PipelineDefinition::new());
        let alert = PipelineAlert::new(&pipeline.id, "failures", AlertCondition::ExecutionFailure)
            .with_target(NotificationTarget::Email {
                address: "ops@example.com".to_string(),
            });

        let store = Arc::new(InMemoryStore::new());
        store.insert_alert(alert).await.unwrap();

        let mut mock = MockNotifier::new();
        mock.expect_notify()
            .times(1)
            .returning(|_, _, _| Err(NotifyError("smtp down".to_string())));

        let evaluator = AlertEvaluator::new(
            store.clone(),
            Arc::new(mock),
            Arc::new(NoOpEventSink),
        );
        evaluator.evaluate(&failed_execution(&pipeline)).await.unwrap();

        // Delivery failed but the trigger still counts.
        let stored = store.alerts_for_pipeline(&pipeline.id).await.unwrap();
        assert_eq!(stored[0].trigger_count, 1);
    }
}
