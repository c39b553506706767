//! Error types for Floodgate.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// The store backend could not be reached or failed an operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Persisted bytes could not be decoded, or a value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid limiter or application configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A strategy or store was used outside of its contract
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// `get` was called for an identity with no stored state
    #[error("No state stored for identity '{0}'")]
    MissingState(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FloodgateError {
    fn from(err: serde_json::Error) -> Self {
        FloodgateError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
