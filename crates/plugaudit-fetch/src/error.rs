//! Retrieval error types.

use thiserror::Error;

/// Result type alias using `RetrievalError`.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Failures while fetching or unpacking a bundle.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Transport failure (connect, timeout, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status after retries were exhausted
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Final HTTP status code
        status: u16,
        /// Requested bundle URL
        url: String,
    },

    /// The payload is not a usable bundle archive
    #[error("malformed archive: {0}")]
    Archive(String),

    /// Scratch directory or extraction I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking extraction task panicked or was cancelled
    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<zip::result::ZipError> for RetrievalError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl RetrievalError {
    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
