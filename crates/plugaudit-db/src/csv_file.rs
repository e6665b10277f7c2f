//! CSV-file result store.
//!
//! The whole file is loaded into an index at open. Each write rewrites the
//! file through a temporary sibling that is renamed into place.

use crate::error::Result;
use crate::record::{from_rows, to_rows, ExportRow};
use crate::store::ResultStore;
use async_trait::async_trait;
use plugaudit_core::AuditResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Result store persisted as one CSV file of [`ExportRow`]s.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    index: RwLock<BTreeMap<String, AuditResult>>,
    write_lock: Mutex<()>,
}

impl CsvStore {
    /// Load the file at `path`, or start empty if it does not exist.
    ///
    /// # Errors
    /// Returns `StoreError` if an existing file cannot be read or decoded.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let load_path = path.clone();
        let results = tokio::task::spawn_blocking(move || load(&load_path)).await??;

        tracing::debug!("Loaded {} results from {}", results.len(), path.display());

        let index = results
            .into_iter()
            .map(|result| (result.identifier.clone(), result))
            .collect();
        Ok(Self {
            path,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record for `identifier`.
    pub async fn get(&self, identifier: &str) -> Option<AuditResult> {
        self.index.read().await.get(identifier).cloned()
    }

    /// Number of stored identifiers.
    pub async fn count(&self) -> usize {
        self.index.read().await.len()
    }

    /// All records flattened to rows, ordered by identifier.
    pub async fn export_rows(&self) -> Vec<ExportRow> {
        self.index.read().await.values().flat_map(to_rows).collect()
    }
}

#[async_trait]
impl ResultStore for CsvStore {
    async fn already_done(&self, identifier: &str) -> Result<bool> {
        Ok(self.index.read().await.contains_key(identifier))
    }

    async fn add_result(&self, result: &AuditResult) -> Result<()> {
        if !result.verdict.is_persisted() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;

        let mut next = self.index.read().await.clone();
        next.insert(result.identifier.clone(), result.clone());
        let rows: Vec<ExportRow> = next.values().flat_map(to_rows).collect();

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &rows)).await??;

        *self.index.write().await = next;
        tracing::debug!(identifier = %result.identifier, "Stored result");
        Ok(())
    }
}

fn load(path: &Path) -> Result<Vec<AuditResult>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<ExportRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    from_rows(rows)
}

fn write_atomic(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
