//! Error types for forecast-publish crate.

use thiserror::Error;

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The HTTP bridge could not be reached or rejected the message.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The message body could not be encoded.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bus refused the message.
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    /// Retries ran out before the message was accepted.
    #[error("gave up publishing to {address} after {attempts} attempts")]
    Exhausted { address: String, attempts: u32 },

    /// Bus configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;
