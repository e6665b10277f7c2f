//! Store error types.
//!
//! Provides error handling for result store operations using `thiserror`.

use thiserror::Error;

/// Result store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the backing store.
    #[error("failed to open store: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Failed to decode a persisted value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error during store operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking file task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
