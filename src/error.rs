//! Error types for the Slidegate limiter.

use thiserror::Error;

/// Main error type for Slidegate operations.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Malformed caller input: empty key, zero limit or zero window
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup of an action name that has no registered policy
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failures
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlidegateError {
    /// Whether this error came from malformed caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SlidegateError::InvalidArgument(_))
    }

    /// Whether this error came from an unregistered action name.
    pub fn is_unknown_policy(&self) -> bool {
        matches!(self, SlidegateError::UnknownPolicy(_))
    }
}

impl From<config::ConfigError> for SlidegateError {
    fn from(err: config::ConfigError) -> Self {
        SlidegateError::Config(err.to_string())
    }
}

/// Result type alias for Slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
