//! One background enrichment run.
//!
//! A task asks the completion service for BOM items covering the recent
//! conversation and merges them into its session's artifact. It writes only
//! while its session still holds a handle with the task's generation, so a
//! superseded or cancelled run never touches the record.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bomwright_core::types::{BomItem, EnrichmentStatus};

use crate::completion::CompletionService;
use crate::coordinator::StatsCounters;
use crate::merge::{classify, merge};
use crate::payload::extract_bom_items;
use crate::prompt::build_enrichment_prompt;
use crate::session::SessionStore;
use crate::state_machine::validate_transition;

/// How a task run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Items were merged into the artifact.
    Completed { added: usize, updated: usize },
    TimedOut,
    Failed(String),
    /// The cancellation token fired while waiting on the service.
    Cancelled,
    /// The session no longer belonged to this task when it tried to write.
    Superseded,
}

pub struct EnrichmentTask {
    pub(crate) session_id: String,
    pub(crate) generation: u64,
    pub(crate) context: String,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) completion: Arc<dyn CompletionService>,
    pub(crate) timeout: Duration,
    pub(crate) max_context_chars: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) stats: Arc<StatsCounters>,
}

impl EnrichmentTask {
    pub async fn run(self) -> TaskOutcome {
        let _guard = OwnershipGuard {
            store: Arc::clone(&self.store),
            session_id: self.session_id.clone(),
            generation: self.generation,
        };

        if !self.begin() {
            debug!(session_id = %self.session_id, generation = self.generation, "Enrichment superseded before start");
            return TaskOutcome::Superseded;
        }

        let prompt = build_enrichment_prompt(&self.context, self.max_context_chars);
        let call = tokio::time::timeout(self.timeout, self.completion.complete(&prompt));

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(session_id = %self.session_id, generation = self.generation, "Enrichment cancelled");
                self.stats.record_cancelled();
                return TaskOutcome::Cancelled;
            }
            result = call => result,
        };

        match result {
            Err(_) => {
                let message = format!(
                    "BOM update timed out after {:.1}s",
                    self.timeout.as_secs_f64()
                );
                self.finish_with_error(message, TaskOutcome::TimedOut)
            }
            Ok(Err(e)) => {
                let message = format!("BOM update failed: {e}");
                self.finish_with_error(message.clone(), TaskOutcome::Failed(message))
            }
            Ok(Ok(text)) => match extract_bom_items(&text) {
                Ok(items) => self.finish_with_items(items),
                Err(e) => {
                    let message = format!("BOM update failed: {e}");
                    self.finish_with_error(message.clone(), TaskOutcome::Failed(message))
                }
            },
        }
    }

    /// Move the session from queued to processing if this task still owns it.
    fn begin(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let generation = self.generation;
        let started = self.store.with_record(&self.session_id, |record| {
            if !record.owned_by(generation)
                || validate_transition(record.status, EnrichmentStatus::Processing).is_err()
            {
                return false;
            }
            record.status = EnrichmentStatus::Processing;
            true
        });
        matches!(started, Ok(Some(true)))
    }

    fn finish_with_items(&self, items: Vec<BomItem>) -> TaskOutcome {
        let generation = self.generation;
        let cancelled = self.cancel.is_cancelled();
        let written = self.store.with_record(&self.session_id, |record| {
            if cancelled || !record.owned_by(generation) {
                return None;
            }
            let (added, updated) = classify(&record.artifact, &items);
            record.artifact = merge(&record.artifact, &items);
            record.touch();
            record.last_error = None;
            record.status = EnrichmentStatus::Complete;
            record.take_task();
            Some((added, updated, record.artifact.len()))
        });

        match written {
            Ok(Some(Some((added, updated, total)))) => {
                info!(
                    session_id = %self.session_id,
                    added,
                    updated,
                    total,
                    "BOM updated"
                );
                self.stats.record_completed();
                TaskOutcome::Completed { added, updated }
            }
            Ok(_) => {
                debug!(session_id = %self.session_id, generation, "Discarded result of superseded enrichment");
                TaskOutcome::Superseded
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Failed to store enrichment result");
                self.stats.record_failed();
                TaskOutcome::Failed(e.to_string())
            }
        }
    }

    fn finish_with_error(&self, message: String, outcome: TaskOutcome) -> TaskOutcome {
        let generation = self.generation;
        let cancelled = self.cancel.is_cancelled();
        let logged = message.clone();
        let written = self.store.with_record(&self.session_id, move |record| {
            if cancelled || !record.owned_by(generation) {
                return false;
            }
            record.status = EnrichmentStatus::Error;
            record.last_error = Some(message);
            record.take_task();
            true
        });

        match written {
            Ok(Some(true)) => {
                warn!(session_id = %self.session_id, error = %logged, "Enrichment did not complete");
                match outcome {
                    TaskOutcome::TimedOut => self.stats.record_timed_out(),
                    _ => self.stats.record_failed(),
                }
                outcome
            }
            _ => TaskOutcome::Superseded,
        }
    }
}

/// Releases the session's handle when the task ends by any path.
///
/// If the task still owns its session at that point and left it queued or
/// processing, the status is forced to error.
struct OwnershipGuard {
    store: Arc<SessionStore>,
    session_id: String,
    generation: u64,
}

impl Drop for OwnershipGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        let session_id = &self.session_id;
        let _ = self.store.with_record(session_id, |record| {
            if !record.owned_by(generation) {
                return;
            }
            record.take_task();
            if !record.status.is_terminal() {
                warn!(session_id = %session_id, generation, "Enrichment task ended without a result");
                record.status = EnrichmentStatus::Error;
                record.last_error = Some("BOM update failed: task ended unexpectedly".to_string());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{MockCompletion, MockReply};
    use crate::session::{SessionRecord, TaskHandle};

    const APP_SERVICE_REPLY: &str = r#"```json
{"bom_items": [{"serviceName": "App Service", "sku": "P1v2", "quantity": 2, "region": "East US"}]}
```"#;

    fn setup(
        reply: MockReply,
        timeout: Duration,
    ) -> (Arc<SessionStore>, EnrichmentTask, CancellationToken) {
        let store = Arc::new(SessionStore::new());
        let cancel = CancellationToken::new();
        let mut record = SessionRecord::new();
        record.replace_task(TaskHandle::new(1, cancel.clone()));
        record.status = EnrichmentStatus::Queued;
        store.set("s1", record).unwrap();

        let task = EnrichmentTask {
            session_id: "s1".to_string(),
            generation: 1,
            context: "User: I need a web app in East US".to_string(),
            store: Arc::clone(&store),
            completion: Arc::new(MockCompletion::new(reply)),
            timeout,
            max_context_chars: 1000,
            cancel: cancel.clone(),
            stats: Arc::new(StatsCounters::default()),
        };
        (store, task, cancel)
    }

    #[tokio::test]
    async fn test_successful_run_merges_items() {
        let (store, task, _) = setup(MockReply::text(APP_SERVICE_REPLY), Duration::from_secs(5));
        let stats = Arc::clone(&task.stats);

        let outcome = task.run().await;
        assert_eq!(outcome, TaskOutcome::Completed { added: 1, updated: 0 });

        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Complete);
        assert_eq!(snap.artifact.len(), 1);
        assert_eq!(snap.artifact[0].service_name, "App Service");
        assert!(snap.last_update.is_some());
        assert!(snap.last_error.is_none());
        assert!(!snap.has_task);
        assert_eq!(stats.snapshot().completed, 1);
    }

    #[tokio::test]
    async fn test_reply_without_items_completes_empty() {
        let (store, task, _) = setup(MockReply::text("Nothing concrete yet."), Duration::from_secs(5));
        assert_eq!(task.run().await, TaskOutcome::Completed { added: 0, updated: 0 });
        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Complete);
        assert!(snap.artifact.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_sets_error() {
        let (store, task, _) = setup(
            MockReply::delayed(APP_SERVICE_REPLY, Duration::from_millis(500)),
            Duration::from_millis(20),
        );
        let stats = Arc::clone(&task.stats);
        assert_eq!(task.run().await, TaskOutcome::TimedOut);

        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Error);
        assert!(snap.last_error.unwrap().contains("timed out"));
        assert!(snap.artifact.is_empty());
        assert!(!snap.has_task);
        assert_eq!(stats.snapshot().timed_out, 1);
    }

    #[tokio::test]
    async fn test_service_failure_sets_error() {
        let (store, task, _) = setup(MockReply::failure("model offline"), Duration::from_secs(5));
        assert!(matches!(task.run().await, TaskOutcome::Failed(_)));

        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Error);
        let error = snap.last_error.unwrap();
        assert!(error.contains("failed"));
        assert!(error.contains("model offline"));
    }

    #[tokio::test]
    async fn test_malformed_payload_sets_error() {
        let (store, task, _) = setup(
            MockReply::text("```json\n{\"bom_items\": [\n```"),
            Duration::from_secs(5),
        );
        assert!(matches!(task.run().await, TaskOutcome::Failed(_)));
        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Error);
        assert!(snap.last_error.unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn test_cancelled_task_leaves_record_untouched() {
        let (store, task, cancel) = setup(
            MockReply::delayed(APP_SERVICE_REPLY, Duration::from_millis(300)),
            Duration::from_secs(5),
        );
        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Supersede the way the coordinator does: swap the handle, then cancel.
        store
            .with_record("s1", |r| {
                r.replace_task(TaskHandle::new(2, CancellationToken::new()));
                r.status = EnrichmentStatus::Queued;
            })
            .unwrap();
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), TaskOutcome::Cancelled);
        let snap = store.get("s1").unwrap();
        assert!(snap.artifact.is_empty());
        assert_eq!(snap.status, EnrichmentStatus::Queued);
        assert!(snap.has_task);
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_write() {
        let (store, task, _) = setup(MockReply::text(APP_SERVICE_REPLY), Duration::from_secs(5));
        store
            .with_record("s1", |r| {
                r.status = EnrichmentStatus::Processing;
                r.replace_task(TaskHandle::new(9, CancellationToken::new()));
            })
            .unwrap();

        let outcome = task.finish_with_items(vec![]);
        assert_eq!(outcome, TaskOutcome::Superseded);
        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Processing);
        assert!(snap.last_update.is_none());
    }

    #[tokio::test]
    async fn test_superseded_before_start() {
        let (store, task, _) = setup(MockReply::text(APP_SERVICE_REPLY), Duration::from_secs(5));
        store
            .with_record("s1", |r| {
                r.replace_task(TaskHandle::new(2, CancellationToken::new()));
            })
            .unwrap();

        assert_eq!(task.run().await, TaskOutcome::Superseded);
        assert!(store.get("s1").unwrap().artifact.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_session_is_not_recreated() {
        let (store, task, _) = setup(
            MockReply::delayed(APP_SERVICE_REPLY, Duration::from_millis(50)),
            Duration::from_secs(5),
        );
        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.delete("s1").unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            TaskOutcome::Cancelled | TaskOutcome::Superseded
        ));
        assert!(store.get("s1").is_none());
    }

    #[tokio::test]
    async fn test_guard_marks_abandoned_task_as_error() {
        let (store, task, _) = setup(
            MockReply::delayed(APP_SERVICE_REPLY, Duration::from_secs(10)),
            Duration::from_secs(30),
        );
        let handle = tokio::spawn(task.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("s1").unwrap().status, EnrichmentStatus::Processing);

        handle.abort();
        let _ = handle.await;

        let snap = store.get("s1").unwrap();
        assert_eq!(snap.status, EnrichmentStatus::Error);
        assert!(!snap.has_task);
        assert!(snap.last_error.unwrap().contains("failed"));
    }
}
