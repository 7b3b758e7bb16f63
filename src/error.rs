//! Error types for the Gatekeeper service.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy with a zero limit or window
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// The counter actor could not be reached or answered with an error
    #[error("Counter backend error: {0}")]
    Backend(String),

    /// The counter actor did not answer within the call timeout
    #[error("Counter backend timed out after {0:?}")]
    Timeout(Duration),

    /// The counter actor answered with a body we could not decode
    #[error("Malformed counter response: {0}")]
    MalformedResponse(String),

    /// HTTP transport errors talking to a remote counter service
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(err: config::ConfigError) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
