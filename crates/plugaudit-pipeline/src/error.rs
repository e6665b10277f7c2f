use plugaudit_db::StoreError;
use plugaudit_fetch::RetrievalError;
use thiserror::Error;

/// Failures inside a single audit task.
///
/// None of these abort a run; they become `Error` verdicts or log lines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bundle could not be retrieved or unpacked
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Scan task panicked or was cancelled
    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Result store rejected a read or write
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Source archival failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem error while archiving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
