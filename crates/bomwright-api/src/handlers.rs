//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters or JSON bodies via axum
//! extractors, calls into the conversation or coordinator, and returns JSON.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use bomwright_core::types::TurnRole;
use bomwright_enrich::{EnrichmentStats, StatusReport, TurnOutcome};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub enrichment: EnrichmentStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub session_id: String,
    pub existed: bool,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - liveness plus enrichment counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sessions: state.store.len(),
        enrichment: state.coordinator.stats(),
    })
}

/// POST /chat - process one user turn. Returns before enrichment finishes.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let Json(body) = body?;
    let outcome = state
        .conversation
        .handle_turn(body.session_id.as_deref(), &body.message)
        .await?;
    Ok(Json(outcome))
}

/// GET /bom/{session_id} - current artifact and enrichment status.
///
/// Unknown sessions report an empty, idle artifact.
pub async fn bom_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<StatusReport> {
    Json(state.coordinator.status(&session_id))
}

/// GET /history/{session_id} - conversation transcript.
pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state.conversation.history(&session_id)?;
    let history = turns
        .into_iter()
        .map(|turn| HistoryEntry {
            role: turn.role,
            content: turn.content,
        })
        .collect();
    Ok(Json(HistoryResponse {
        session_id,
        history,
    }))
}

/// POST /reset - drop a session and cancel its enrichment.
pub async fn reset(
    State(state): State<AppState>,
    body: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, ApiError> {
    let Json(body) = body?;
    let session_id = body.session_id.trim().to_string();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }
    let existed = state.conversation.reset(&session_id)?;
    Ok(Json(ResetResponse {
        status: "reset".to_string(),
        session_id,
        existed,
    }))
}
