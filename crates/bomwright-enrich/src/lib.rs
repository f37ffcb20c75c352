//! Conversation handling and asynchronous BOM enrichment for Bomwright.
//!
//! Turns are answered immediately. When a turn looks relevant, a background
//! task asks the completion service for BOM items and merges them into the
//! session's artifact, one live task per session, latest trigger wins.

pub mod catalog;
pub mod completion;
pub mod conversation;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod merge;
pub mod payload;
pub mod prompt;
pub mod session;
pub mod state_machine;
pub mod status;
pub mod task;
pub mod trigger;

pub use catalog::normalize_service_name;
pub use completion::{CompletionService, MockCompletion, MockReply};
pub use conversation::{Conversation, TurnOutcome};
pub use coordinator::{EnrichmentCoordinator, EnrichmentStats};
pub use error::{CompletionError, EnrichError, PayloadError};
pub use http::HttpCompletionClient;
pub use merge::merge;
pub use payload::{extract_bom_items, parse_completion, TurnCompletion};
pub use session::{SessionRecord, SessionSnapshot, SessionStore};
pub use status::{StatusReport, StatusReporter};
pub use task::TaskOutcome;
pub use trigger::TriggerPolicy;
