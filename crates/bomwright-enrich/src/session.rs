//! In-memory session records.
//!
//! Each record holds the conversation history, the BOM artifact, the
//! enrichment status and at most one live task handle. All mutation goes
//! through [`SessionStore`], whose lock is never held across an await.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bomwright_core::types::{BomItem, EnrichmentStatus, Turn};

use crate::error::EnrichError;
use crate::task::TaskOutcome;

pub type SessionId = String;

// =============================================================================
// Task handle
// =============================================================================

/// Live background task owned by a session.
///
/// The generation identifies which trigger spawned the task. A task may
/// write to its session only while the record still holds a handle with
/// its generation.
#[derive(Debug)]
pub struct TaskHandle {
    generation: u64,
    cancel: CancellationToken,
    join: Option<JoinHandle<TaskOutcome>>,
}

impl TaskHandle {
    pub fn new(generation: u64, cancel: CancellationToken) -> Self {
        Self {
            generation,
            cancel,
            join: None,
        }
    }

    pub fn with_join(mut self, join: JoinHandle<TaskOutcome>) -> Self {
        self.join = Some(join);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Signal the task to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

// =============================================================================
// Record
// =============================================================================

/// Full per-session state.
#[derive(Debug)]
pub struct SessionRecord {
    pub history: Vec<Turn>,
    pub turn_count: u32,
    pub artifact: Vec<BomItem>,
    pub status: EnrichmentStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub requirements: Option<String>,
    pub created_at: DateTime<Utc>,
    task: Option<TaskHandle>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            turn_count: 0,
            artifact: Vec::new(),
            status: EnrichmentStatus::Idle,
            last_update: None,
            last_error: None,
            requirements: None,
            created_at: Utc::now(),
            task: None,
        }
    }
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(&self) -> Option<&TaskHandle> {
        self.task.as_ref()
    }

    /// Whether the live task handle belongs to `generation`.
    pub fn owned_by(&self, generation: u64) -> bool {
        self.task
            .as_ref()
            .is_some_and(|t| t.generation == generation)
    }

    /// Install a new task handle, returning the one it replaces.
    pub fn replace_task(&mut self, handle: TaskHandle) -> Option<TaskHandle> {
        self.task.replace(handle)
    }

    pub fn take_task(&mut self) -> Option<TaskHandle> {
        self.task.take()
    }

    /// Record a new artifact write at a strictly later instant than the last.
    pub fn touch(&mut self) {
        self.last_update = Some(next_update_stamp(self.last_update));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            history: self.history.clone(),
            turn_count: self.turn_count,
            artifact: self.artifact.clone(),
            status: self.status,
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            requirements: self.requirements.clone(),
            created_at: self.created_at,
            has_task: self.task.is_some(),
        }
    }

    fn cancel_task(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.cancel();
        }
    }
}

/// Read-only copy of a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub history: Vec<Turn>,
    pub turn_count: u32,
    pub artifact: Vec<BomItem>,
    pub status: EnrichmentStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub requirements: Option<String>,
    pub created_at: DateTime<Utc>,
    pub has_task: bool,
}

/// Millisecond timestamp strictly after `previous`.
pub fn next_update_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let now = now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now);
    match previous {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    }
}

// =============================================================================
// Store
// =============================================================================

/// Thread-safe map of session id to record.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(session_id).map(SessionRecord::snapshot)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false)
    }

    /// Insert or replace a record. A replaced record's task is cancelled.
    pub fn set(&self, session_id: &str, record: SessionRecord) -> Result<(), EnrichError> {
        let mut sessions = self.lock()?;
        if let Some(mut old) = sessions.insert(session_id.to_string(), record) {
            old.cancel_task();
        }
        Ok(())
    }

    /// Remove a record, cancelling its task. Returns whether it existed.
    pub fn delete(&self, session_id: &str) -> Result<bool, EnrichError> {
        let mut sessions = self.lock()?;
        match sessions.remove(session_id) {
            Some(mut record) => {
                record.cancel_task();
                debug!(session_id, "Session deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every record, cancelling all tasks. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, EnrichError> {
        let mut sessions = self.lock()?;
        let count = sessions.len();
        for (_, mut record) in sessions.drain() {
            record.cancel_task();
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against an existing record under the store lock.
    pub fn with_record<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Result<Option<R>, EnrichError> {
        let mut sessions = self.lock()?;
        Ok(sessions.get_mut(session_id).map(f))
    }

    /// Run `f` against a record, creating an empty one first if needed.
    pub fn with_record_or_default<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Result<R, EnrichError> {
        let mut sessions = self.lock()?;
        let record = sessions.entry(session_id.to_string()).or_default();
        Ok(f(record))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, SessionRecord>>, EnrichError> {
        self.sessions
            .lock()
            .map_err(|_| EnrichError::StorageError("session lock poisoned".to_string()))
    }
}
