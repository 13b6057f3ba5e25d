//! Error types for the broadcast pipeline.

use std::time::Duration;
use thiserror::Error;

/// Main error type for buffer, subscriber and pipeline operations.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Buffer is closed: end-of-stream already signalled")]
    Closed,

    #[error("Subscribers still active after {grace:?}: {pending:?}")]
    CompletionTimeout {
        pending: Vec<String>,
        grace: Duration,
    },

    #[error("Subscriber {name} failed: {reason}")]
    Subscriber { name: String, reason: String },

    #[error("Producer thread panicked")]
    ProducerPanicked,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        FlowError::Serialization(e.to_string())
    }
}

/// Error returned by item handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, FlowError>;
