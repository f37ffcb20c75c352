//! Conversational turn handling.
//!
//! Validates user input, enforces the per-session turn limit, gets the next
//! assistant reply and hands the exchange to the enrichment coordinator.
//! Returns without waiting on any background work.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use bomwright_core::config::ConversationConfig;
use bomwright_core::types::{BomItem, EnrichmentStatus, Turn};

use crate::completion::CompletionService;
use crate::coordinator::EnrichmentCoordinator;
use crate::error::EnrichError;
use crate::payload::parse_completion;
use crate::prompt::{build_turn_prompt, recent_context};
use crate::session::SessionStore;

/// Result of one accepted user turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    /// Assistant text for display. Empty when the reply is a bare JSON document.
    pub response: String,
    pub is_done: bool,
    pub requirements_summary: Option<String>,
    pub turn_number: u32,
    pub items: Vec<BomItem>,
    pub enrichment_status: EnrichmentStatus,
    pub enrichment_triggered: bool,
}

pub struct Conversation {
    store: Arc<SessionStore>,
    completion: Arc<dyn CompletionService>,
    coordinator: Arc<EnrichmentCoordinator>,
    config: ConversationConfig,
}

impl Conversation {
    pub fn new(
        store: Arc<SessionStore>,
        completion: Arc<dyn CompletionService>,
        coordinator: Arc<EnrichmentCoordinator>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            store,
            completion,
            coordinator,
            config,
        }
    }

    /// Process one user message.
    ///
    /// A missing or blank `session_id` starts a new session. A session reset
    /// while the reply is pending yields `SessionNotFound`.
    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, EnrichError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EnrichError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(EnrichError::MessageTooLong(self.config.max_message_length));
        }

        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let max_turns = self.config.max_turns;

        let (history, created_at) = self
            .store
            .with_record_or_default(&session_id, |record| {
                if record.turn_count >= max_turns {
                    Err(EnrichError::TurnLimitReached { max: max_turns })
                } else {
                    Ok((record.history.clone(), record.created_at))
                }
            })??;

        let prompt = build_turn_prompt(&history, message);
        let reply = self.completion.complete(&prompt).await?;
        let completion = parse_completion(&reply);

        let context_messages = self.config.context_messages;
        let (turn_number, context) = self
            .store
            .with_record(&session_id, |record| {
                // The session was reset while the reply was pending.
                if record.created_at != created_at {
                    return Err(EnrichError::SessionNotFound(session_id.clone()));
                }
                // Re-checked: another turn for this session may have landed meanwhile.
                if record.turn_count >= max_turns {
                    return Err(EnrichError::TurnLimitReached { max: max_turns });
                }
                record.turn_count += 1;
                record.history.push(Turn::user(message));
                record.history.push(Turn::assistant(reply.as_str()));
                if let Some(requirements) = &completion.requirements {
                    record.requirements = Some(requirements.clone());
                }
                Ok((
                    record.turn_count,
                    recent_context(&record.history, context_messages),
                ))
            })?
            .ok_or_else(|| EnrichError::SessionNotFound(session_id.clone()))??;

        info!(
            session_id = %session_id,
            turn_number,
            done = completion.done,
            "Turn processed"
        );

        let triggered =
            self.coordinator
                .on_exchange(&session_id, message, &reply, turn_number, context)?;

        let (items, enrichment_status) = self
            .store
            .get(&session_id)
            .map(|snap| (snap.artifact, snap.status))
            .unwrap_or_default();

        Ok(TurnOutcome {
            response: display_text(&reply),
            is_done: completion.done,
            requirements_summary: completion.requirements,
            session_id,
            turn_number,
            items,
            enrichment_status,
            enrichment_triggered: triggered,
        })
    }

    /// Full history of a session.
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>, EnrichError> {
        self.store
            .get(session_id)
            .map(|snap| snap.history)
            .ok_or_else(|| EnrichError::SessionNotFound(session_id.to_string()))
    }

    /// Drop a session and cancel its enrichment. Returns whether it existed.
    pub fn reset(&self, session_id: &str) -> Result<bool, EnrichError> {
        let existed = self.store.delete(session_id)?;
        if existed {
            info!(session_id, "Session reset");
        }
        Ok(existed)
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}

/// Replies that are a bare JSON document are not shown to the user.
fn display_text(reply: &str) -> String {
    if reply.trim_start().starts_with('{') {
        String::new()
    } else {
        reply.to_string()
    }
}
