//! The result store contract and backend selection.

use crate::csv_file::CsvStore;
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use async_trait::async_trait;
use plugaudit_core::{AuditResult, StorageBackend, StorageConfig};
use std::sync::Arc;

/// Durable mapping from identifier to its latest audit result.
///
/// Implementations keep at most one current record per identifier: a
/// second `add_result` for the same identifier replaces the first,
/// evidence included. `Skipped` results are accepted and ignored.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Whether a result for `identifier` has been persisted.
    async fn already_done(&self, identifier: &str) -> Result<bool>;

    /// Insert or replace the record for `result.identifier`.
    async fn add_result(&self, result: &AuditResult) -> Result<()>;
}

/// Open the backend named in `config`.
///
/// # Errors
/// Returns `StoreError` if the backing file or database cannot be opened.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ResultStore>> {
    tracing::info!(
        "Opening {:?} result store at {}",
        config.backend,
        config.path.display()
    );
    let store: Arc<dyn ResultStore> = match config.backend {
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&config.path).await?),
        StorageBackend::Csv => Arc::new(CsvStore::open(&config.path).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
