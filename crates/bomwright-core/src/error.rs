use thiserror::Error;

/// Top-level error type for the Bomwright system.
///
/// Covers configuration loading and server startup. Subsystem crates
/// define their own error types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BomwrightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for BomwrightError {
    fn from(err: toml::de::Error) -> Self {
        BomwrightError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BomwrightError {
    fn from(err: toml::ser::Error) -> Self {
        BomwrightError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BomwrightError {
    fn from(err: serde_json::Error) -> Self {
        BomwrightError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Bomwright operations.
pub type Result<T> = std::result::Result<T, BomwrightError>;
