//! Application state shared across all route handlers.
//!
//! AppState holds references to the session store, the enrichment
//! coordinator and the conversation handler. It is passed to handlers via
//! axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use bomwright_core::config::BomwrightConfig;
use bomwright_enrich::{CompletionService, Conversation, EnrichmentCoordinator, SessionStore};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<BomwrightConfig>,
    /// In-memory session records.
    pub store: Arc<SessionStore>,
    /// Background enrichment scheduler.
    pub coordinator: Arc<EnrichmentCoordinator>,
    /// Turn handler.
    pub conversation: Arc<Conversation>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create state where turns and enrichment share one completion service.
    pub fn new(config: BomwrightConfig, completion: Arc<dyn CompletionService>) -> Self {
        Self::with_services(config, Arc::clone(&completion), completion)
    }

    /// Create state with separate completion services for turns and enrichment.
    pub fn with_services(
        config: BomwrightConfig,
        turn_completion: Arc<dyn CompletionService>,
        enrichment_completion: Arc<dyn CompletionService>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let coordinator = Arc::new(EnrichmentCoordinator::new(
            Arc::clone(&store),
            enrichment_completion,
            &config.enrichment,
        ));
        let conversation = Arc::new(Conversation::new(
            Arc::clone(&store),
            turn_completion,
            Arc::clone(&coordinator),
            config.conversation.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
            coordinator,
            conversation,
            start_time: Instant::now(),
        }
    }
}
