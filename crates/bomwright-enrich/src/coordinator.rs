//! Schedules background enrichment, one live task per session.
//!
//! A trigger cancels whatever task the session already has and installs a
//! fresh one under the store lock. The caller never waits for the task;
//! progress is observed by polling [`EnrichmentCoordinator::status`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use bomwright_core::config::EnrichmentConfig;
use bomwright_core::types::EnrichmentStatus;

use crate::completion::CompletionService;
use crate::error::EnrichError;
use crate::session::{SessionStore, TaskHandle};
use crate::state_machine::validate_transition;
use crate::status::{StatusReport, StatusReporter};
use crate::task::EnrichmentTask;
use crate::trigger::TriggerPolicy;

// =============================================================================
// Stats
// =============================================================================

/// Lifetime counters for enrichment activity.
#[derive(Debug, Default)]
pub struct StatsCounters {
    triggered: AtomicU64,
    superseded: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_triggered(&self) {
        self.triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EnrichmentStats {
        EnrichmentStats {
            triggered: self.triggered.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub triggered: u64,
    pub superseded: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub cancelled: u64,
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct EnrichmentCoordinator {
    store: Arc<SessionStore>,
    completion: Arc<dyn CompletionService>,
    policy: TriggerPolicy,
    reporter: StatusReporter,
    enabled: bool,
    timeout: Duration,
    max_context_chars: usize,
    next_generation: AtomicU64,
    stats: Arc<StatsCounters>,
}

impl EnrichmentCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        completion: Arc<dyn CompletionService>,
        config: &EnrichmentConfig,
    ) -> Self {
        Self {
            reporter: StatusReporter::new(Arc::clone(&store)),
            store,
            completion,
            policy: TriggerPolicy::from_config(config),
            enabled: config.enabled,
            timeout: config.timeout(),
            max_context_chars: config.max_context_chars,
            next_generation: AtomicU64::new(0),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn policy(&self) -> &TriggerPolicy {
        &self.policy
    }

    /// Schedule enrichment for `session_id` over `context`, superseding any
    /// task the session already has. Returns the new task's generation.
    ///
    /// Must be called from within a Tokio runtime. Creates the session if it
    /// does not exist.
    pub fn trigger(&self, session_id: &str, context: String) -> Result<u64, EnrichError> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.store
            .with_record_or_default(session_id, |record| -> Result<(), EnrichError> {
                validate_transition(record.status, EnrichmentStatus::Queued)?;

                if let Some(previous) = record.take_task() {
                    previous.cancel();
                    self.stats.record_superseded();
                    debug!(
                        session_id,
                        superseded = previous.generation(),
                        generation,
                        "Superseding in-flight enrichment"
                    );
                }

                let cancel = CancellationToken::new();
                let task = EnrichmentTask {
                    session_id: session_id.to_string(),
                    generation,
                    context,
                    store: Arc::clone(&self.store),
                    completion: Arc::clone(&self.completion),
                    timeout: self.timeout,
                    max_context_chars: self.max_context_chars,
                    cancel: cancel.clone(),
                    stats: Arc::clone(&self.stats),
                };
                let join = tokio::spawn(task.run());

                record.replace_task(TaskHandle::new(generation, cancel).with_join(join));
                record.status = EnrichmentStatus::Queued;
                Ok(())
            })??;

        self.stats.record_triggered();
        info!(session_id, generation, "Enrichment queued");
        Ok(generation)
    }

    /// Apply the trigger policy to a processed assistant turn.
    ///
    /// Returns whether enrichment was scheduled.
    pub fn on_turn_processed(
        &self,
        session_id: &str,
        assistant_text: &str,
        turn_number: u32,
        context: String,
    ) -> Result<bool, EnrichError> {
        self.on_exchange(session_id, "", assistant_text, turn_number, context)
    }

    /// Like [`on_turn_processed`](Self::on_turn_processed), but a user
    /// message that names a cloud service also schedules enrichment.
    pub fn on_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        turn_number: u32,
        context: String,
    ) -> Result<bool, EnrichError> {
        if !self.enabled {
            return Ok(false);
        }

        let reason = self.policy.reason(assistant_text, turn_number);
        let user_mention = self.policy.mentions_services(user_text);
        if reason.is_none() && !user_mention {
            return Ok(false);
        }

        debug!(session_id, turn_number, ?reason, user_mention, "Turn triggers enrichment");
        self.trigger(session_id, context)?;
        Ok(true)
    }

    /// Current artifact and status. Never waits for a running task.
    pub fn status(&self, session_id: &str) -> StatusReport {
        self.reporter.report(session_id)
    }

    pub fn reporter(&self) -> StatusReporter {
        self.reporter.clone()
    }

    pub fn stats(&self) -> EnrichmentStats {
        self.stats.snapshot()
    }

    /// Cancel every task and drop all sessions.
    pub fn shutdown(&self) -> Result<usize, EnrichError> {
        let removed = self.store.clear()?;
        info!(sessions = removed, "Enrichment coordinator shut down");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::completion::{MockCompletion, MockReply};

    fn reply_for(service: &str) -> String {
        format!(
            "```json\n{{\"bom_items\": [{{\"serviceName\": \"{service}\", \"sku\": \"S1\", \"region\": \"East US\"}}]}}\n```"
        )
    }

    fn config(timeout_ms: u64) -> EnrichmentConfig {
        EnrichmentConfig {
            timeout_ms,
            ..EnrichmentConfig::default()
        }
    }

    fn coordinator(
        mock: Arc<MockCompletion>,
        timeout_ms: u64,
    ) -> (Arc<SessionStore>, EnrichmentCoordinator) {
        let store = Arc::new(SessionStore::new());
        let coord = EnrichmentCoordinator::new(Arc::clone(&store), mock, &config(timeout_ms));
        (store, coord)
    }

    async fn wait_for_terminal(coord: &EnrichmentCoordinator, session_id: &str) -> StatusReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let report = coord.status(session_id);
            if report.status.is_terminal() && report.status != EnrichmentStatus::Idle {
                return report;
            }
            assert!(Instant::now() < deadline, "enrichment did not finish");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_trigger_returns_immediately_and_completes() {
        let mock = Arc::new(MockCompletion::new(MockReply::delayed(
            reply_for("App Service"),
            Duration::from_millis(200),
        )));
        let (_, coord) = coordinator(mock, 5_000);

        let start = Instant::now();
        coord.trigger("s1", "User: web app".to_string()).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(coord.status("s1").status, EnrichmentStatus::Queued);

        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Complete);
        assert_eq!(report.items.len(), 1);
        assert!(report.last_update.is_some());
        assert_eq!(coord.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_single_flight_latest_wins() {
        let mock = Arc::new(MockCompletion::replying("unused"));
        mock.push(MockReply::delayed(reply_for("App Service"), Duration::from_millis(300)))
            .push(MockReply::delayed(reply_for("SQL Database"), Duration::from_millis(10)));
        let (store, coord) = coordinator(Arc::clone(&mock), 5_000);

        coord.trigger("s1", "first".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coord.status("s1").status, EnrichmentStatus::Processing);

        coord.trigger("s1", "second".to_string()).unwrap();
        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Complete);

        // Outlast the first task's delay; its result must never land.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let report = coord.status("s1");
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].service_name, "SQL Database");
        assert_eq!(report.status, EnrichmentStatus::Complete);
        assert!(!store.get("s1").unwrap().has_task);

        let stats = coord.stats();
        assert_eq!(stats.triggered, 2);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_at_most_one_handle_per_session() {
        let mock = Arc::new(MockCompletion::new(MockReply::delayed(
            reply_for("App Service"),
            Duration::from_millis(100),
        )));
        let (store, coord) = coordinator(mock, 5_000);

        let mut generations = Vec::new();
        for i in 0..5 {
            generations.push(coord.trigger("s1", format!("context {i}")).unwrap());
        }
        generations.dedup();
        assert_eq!(generations.len(), 5);

        let snap = store.get("s1").unwrap();
        assert!(snap.has_task);
        assert_eq!(snap.status, EnrichmentStatus::Queued);

        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Complete);
        assert_eq!(coord.stats().superseded, 4);
    }

    #[tokio::test]
    async fn test_timeout_reports_error() {
        let mock = Arc::new(MockCompletion::new(MockReply::delayed(
            reply_for("App Service"),
            Duration::from_millis(500),
        )));
        let (_, coord) = coordinator(mock, 30);

        coord.trigger("s1", "ctx".to_string()).unwrap();
        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Error);
        assert!(report.last_error.unwrap().contains("timed out"));
        assert!(report.items.is_empty());
        assert_eq!(coord.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn test_failure_then_success_clears_error() {
        let mock = Arc::new(MockCompletion::replying(reply_for("Key Vault")));
        mock.push(MockReply::failure("boom"));
        let (_, coord) = coordinator(mock, 5_000);

        coord.trigger("s1", "ctx".to_string()).unwrap();
        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Error);
        assert!(report.last_error.unwrap().contains("failed"));

        coord.trigger("s1", "ctx".to_string()).unwrap();
        let report = wait_for_terminal(&coord, "s1").await;
        assert_eq!(report.status, EnrichmentStatus::Complete);
        assert!(report.last_error.is_none());
        assert_eq!(report.items[0].service_name, "Key Vault");
    }

    #[tokio::test]
    async fn test_successive_runs_merge_and_advance_timestamp() {
        let mock = Arc::new(MockCompletion::replying("unused"));
        mock.push(MockReply::text(reply_for("App Service")))
            .push(MockReply::text(reply_for("SQL Database")));
        let (_, coord) = coordinator(mock, 5_000);

        coord.trigger("s1", "one".to_string()).unwrap();
        let first = wait_for_terminal(&coord, "s1").await;

        coord.trigger("s1", "two".to_string()).unwrap();
        let second = wait_for_terminal(&coord, "s1").await;

        assert_eq!(second.items.len(), 2);
        assert_eq!(second.items[0].service_name, "App Service");
        assert_eq!(second.items[1].service_name, "SQL Database");
        let t1 = chrono::DateTime::parse_from_rfc3339(&first.last_update.unwrap()).unwrap();
        let t2 = chrono::DateTime::parse_from_rfc3339(&second.last_update.unwrap()).unwrap();
        assert!(t2 > t1);
    }

    #[tokio::test]
    async fn test_on_turn_processed_applies_policy() {
        let mock = Arc::new(MockCompletion::replying(reply_for("App Service")));
        let (_, coord) = coordinator(mock, 5_000);

        assert!(!coord
            .on_turn_processed("s1", "What's your budget?", 1, "ctx".to_string())
            .unwrap());
        assert_eq!(coord.status("s1").status, EnrichmentStatus::Idle);

        assert!(coord
            .on_turn_processed("s1", "Let's use Azure App Service.", 2, "ctx".to_string())
            .unwrap());
        assert_ne!(coord.status("s1").status, EnrichmentStatus::Idle);
    }

    #[tokio::test]
    async fn test_on_exchange_user_mention() {
        let mock = Arc::new(MockCompletion::replying(reply_for("App Service")));
        let (_, coord) = coordinator(mock, 5_000);
        assert!(coord
            .on_exchange("s1", "We run on AKS", "How many nodes?", 1, "ctx".to_string())
            .unwrap());
    }

    #[tokio::test]
    async fn test_disabled_never_triggers() {
        let mock = Arc::new(MockCompletion::replying(reply_for("App Service")));
        let store = Arc::new(SessionStore::new());
        let config = EnrichmentConfig {
            enabled: false,
            ..EnrichmentConfig::default()
        };
        let coord = EnrichmentCoordinator::new(Arc::clone(&store), mock, &config);
        assert!(!coord
            .on_turn_processed("s1", "Let's use Azure App Service.", 3, "ctx".to_string())
            .unwrap());
        assert_eq!(coord.stats().triggered, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let mock = Arc::new(MockCompletion::replying("unused"));
        mock.push(MockReply::delayed(reply_for("App Service"), Duration::from_millis(50)))
            .push(MockReply::delayed(reply_for("Storage"), Duration::from_millis(50)));
        let (_, coord) = coordinator(mock, 5_000);

        coord.trigger("a", "ctx".to_string()).unwrap();
        coord.trigger("b", "ctx".to_string()).unwrap();
        let a = wait_for_terminal(&coord, "a").await;
        let b = wait_for_terminal(&coord, "b").await;
        assert_eq!(a.status, EnrichmentStatus::Complete);
        assert_eq!(b.status, EnrichmentStatus::Complete);
        assert_eq!(coord.stats().superseded, 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_tasks() {
        let mock = Arc::new(MockCompletion::new(MockReply::delayed(
            reply_for("App Service"),
            Duration::from_secs(10),
        )));
        let (store, coord) = coordinator(mock, 30_000);

        coord.trigger("s1", "ctx".to_string()).unwrap();
        coord.trigger("s2", "ctx".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(coord.shutdown().unwrap(), 2);
        assert!(store.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coord.stats().cancelled, 2);
        assert_eq!(coord.status("s1").status, EnrichmentStatus::Idle);
    }
}
