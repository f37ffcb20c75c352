//! Enrichment status transitions.
//!
//! Idle/Complete/Error -> Queued -> Processing -> Complete/Error.
//! A new trigger may supersede a queued or processing task.

use bomwright_core::types::EnrichmentStatus;

use crate::error::EnrichError;

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Idle, Complete, Error -> Queued (new trigger)
/// - Queued, Processing -> Queued (superseding trigger)
/// - Queued -> Processing
/// - Queued -> Error (task ended before it started)
/// - Processing -> Complete
/// - Processing -> Error
pub fn validate_transition(from: EnrichmentStatus, to: EnrichmentStatus) -> Result<(), EnrichError> {
    use EnrichmentStatus::*;

    let valid = matches!(
        (from, to),
        (Idle | Complete | Error, Queued)
            | (Queued | Processing, Queued)
            | (Queued, Processing)
            | (Queued, Error)
            | (Processing, Complete)
            | (Processing, Error)
    );

    if valid {
        Ok(())
    } else {
        Err(EnrichError::InvalidTransition(from, to))
    }
}
