pub mod config;
pub mod error;
pub mod types;

pub use config::BomwrightConfig;
pub use error::{BomwrightError, Result};
pub use types::*;
