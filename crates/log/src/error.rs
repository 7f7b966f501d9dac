//! Logging errors

use thiserror::Error;

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while installing the logger
#[derive(Error, Debug)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter {0}")]
    Filter(String),

    /// A global subscriber is already installed
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}
