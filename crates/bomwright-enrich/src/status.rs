use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Serialize;

use bomwright_core::types::{BomItem, EnrichmentStatus};

use crate::session::{SessionSnapshot, SessionStore};

/// Pollable view of a session's artifact and enrichment state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub items: Vec<BomItem>,
    pub status: EnrichmentStatus,
    /// RFC 3339 with millisecond precision, `None` until the first write.
    pub last_update: Option<String>,
    pub last_error: Option<String>,
}

impl StatusReport {
    /// Report for a session that does not exist (yet).
    pub fn idle() -> Self {
        Self {
            items: Vec::new(),
            status: EnrichmentStatus::Idle,
            last_update: None,
            last_error: None,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            items: snapshot.artifact,
            status: snapshot.status,
            last_update: snapshot
                .last_update
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            last_error: snapshot.last_error,
        }
    }
}

/// Read-only status access that never waits on background work.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<SessionStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn report(&self, session_id: &str) -> StatusReport {
        self.store
            .get(session_id)
            .map(StatusReport::from_snapshot)
            .unwrap_or_else(StatusReport::idle)
    }
}
