//! Error types for the consumer core.

use crate::state::LifecycleState;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`MessageHandler`](crate::MessageHandler)
///
/// Either variant leaves the message unacknowledged.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to decode {kind} payload of message {message_id}: {reason}")]
    Decode {
        message_id: String,
        kind: String,
        reason: String,
    },

    #[error("Message handling failed: {message}")]
    Failed { message: String },
}

impl HandlerError {
    /// Create a processing failure from any displayable error
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors from starting a consumer
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Consumer was already started (state: {state})")]
    AlreadyStarted { state: LifecycleState },

    #[error("Consumer must be started from within a tokio runtime")]
    NoRuntime,
}

/// Errors from stopping a consumer
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Shutdown was interrupted after {elapsed:?}; worker aborted")]
    Interrupted { elapsed: Duration },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
