//! Error types for geoprov.

use thiserror::Error;

/// Main error type for geoprov.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The worker generation serving the call is gone.
    ///
    /// Raised for broken channels, the fatal marker, and call timeouts. By the
    /// time this reaches the caller a replacement generation has already been
    /// requested, so the next call can simply be retried.
    #[error("Fatal error in data provider ({context}): {reason}")]
    Fatal { context: String, reason: String },

    #[error("{context} failed: {message}")]
    Call { context: String, message: String },

    #[error("Data provider unavailable: {0}")]
    Unavailable(String),

    #[error("Data provider has been stopped")]
    Stopped,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Build a fatal error for the call identified by `context`.
    pub fn fatal(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the worker generation died under the call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Result type alias for geoprov operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
