//! Error types for the update lifecycle.

use thiserror::Error;

/// Failure of a single remote operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service answered with an explicit `error` field.
    #[error("{0}")]
    Remote(String),

    /// The request failed: connection, non-2xx status, unreadable body.
    #[error("{0}")]
    Transport(String),
}

/// Failure of a controller operation, as surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Reported by the update service; shown verbatim.
    #[error("{0}")]
    Remote(String),

    /// The request itself failed. May carry an empty message.
    #[error("Update service unreachable: {0}")]
    Transport(String),

    /// Local check failed before any remote call was made.
    #[error("{0}")]
    Precondition(String),

    /// Another download or install is already in flight.
    #[error("Another {0} is already in progress")]
    Busy(&'static str),
}

impl UpdateError {
    /// Message for the user-visible error slot.
    ///
    /// Remote and precondition messages are used as-is. A transport failure
    /// without a usable message falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            UpdateError::Remote(msg) | UpdateError::Precondition(msg) => msg.clone(),
            UpdateError::Transport(msg) if msg.trim().is_empty() => fallback.to_string(),
            UpdateError::Transport(msg) => msg.clone(),
            UpdateError::Busy(_) => self.to_string(),
        }
    }

    /// Short category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::Remote(_) => "remote",
            UpdateError::Transport(_) => "transport",
            UpdateError::Precondition(_) => "precondition",
            UpdateError::Busy(_) => "busy",
        }
    }
}

impl From<ServiceError> for UpdateError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Remote(msg) => UpdateError::Remote(msg),
            ServiceError::Transport(msg) => UpdateError::Transport(msg),
        }
    }
}

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
