//! Error types for conversation handling and background enrichment.

use bomwright_core::types::EnrichmentStatus;

/// Errors surfaced to callers of the turn handler, store and coordinator.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("Maximum conversation turns ({max}) reached")]
    TurnLimitReached { max: u32 },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("invalid enrichment transition: {0} -> {1}")]
    InvalidTransition(EnrichmentStatus, EnrichmentStatus),
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
    #[error("storage error: {0}")]
    StorageError(String),
}

/// Errors from a single call to the completion service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("service returned no content")]
    EmptyResponse,
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// A structured block was present in a reply but could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed BOM payload: {0}")]
    Malformed(String),
}
