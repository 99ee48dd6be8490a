//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Rejected interval or limit; the previous configuration stays in effect
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Empty or malformed token, rejected before any store is touched
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The counter store could not be reached or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Process settings errors
    #[error("Settings error: {0}")]
    Settings(String),

    /// Reading or writing the persisted limit configuration failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for TurnstileError {
    fn from(e: redis::RedisError) -> Self {
        TurnstileError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
