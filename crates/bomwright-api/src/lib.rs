//! Bomwright API crate - axum HTTP server and route handlers.
//!
//! Exposes the conversational endpoint, BOM status polling, history,
//! session reset and health checks.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
