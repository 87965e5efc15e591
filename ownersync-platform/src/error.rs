//! Error types for ownersync-platform.

use thiserror::Error;

/// A platform call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError {
    /// The platform answered with a non-2xx status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// The request never got a response (connect failure, timeout, reset).
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    /// The response body was not what the operation expects.
    #[error("{operation} returned an unexpected response: {message}")]
    Decode { operation: String, message: String },
}

impl CallError {
    /// Transient failures may succeed on a later attempt; permanent ones
    /// (bad request, not found, auth) never will.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            CallError::Transport { .. } => true,
            CallError::Decode { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CallError::Status { status: 404, .. })
    }
}
