//! In-process result store.

use crate::error::Result;
use crate::record::{to_rows, ExportRow};
use crate::store::ResultStore;
use async_trait::async_trait;
use plugaudit_core::AuditResult;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Result store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<BTreeMap<String, AuditResult>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for `identifier`.
    pub async fn get(&self, identifier: &str) -> Option<AuditResult> {
        self.results.read().await.get(identifier).cloned()
    }

    /// Number of stored identifiers.
    pub async fn count(&self) -> usize {
        self.results.read().await.len()
    }

    /// All records flattened to rows, ordered by identifier.
    pub async fn export_rows(&self) -> Vec<ExportRow> {
        self.results.read().await.values().flat_map(to_rows).collect()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn already_done(&self, identifier: &str) -> Result<bool> {
        Ok(self.results.read().await.contains_key(identifier))
    }

    async fn add_result(&self, result: &AuditResult) -> Result<()> {
        if !result.verdict.is_persisted() {
            return Ok(());
        }
        self.results
            .write()
            .await
            .insert(result.identifier.clone(), result.clone());
        Ok(())
    }
}
