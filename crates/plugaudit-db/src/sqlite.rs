//! `SQLite` result store.
//!
//! Results live in `audit_results` (one row per identifier) and their
//! evidence in `audit_evidence`. Every upsert replaces the identifier's
//! evidence inside a single transaction.

use crate::connection::connect;
use crate::error::{Result, StoreError};
use crate::migrations::{get_schema_version, run_migrations};
use crate::record::{to_rows, ExportRow};
use crate::store::ResultStore;
use async_trait::async_trait;
use plugaudit_core::{AuditResult, MatchRecord, Timestamp, Verdict};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tokio::sync::Mutex;

/// Result store backed by an embedded `SQLite` database.
#[derive(Debug)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns `StoreError` if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connect(path).await?;
        run_migrations(&pool).await?;
        let version = get_schema_version(&pool).await?;
        tracing::debug!(version, "Result store schema ready");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an already migrated pool.
    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Current record for `identifier`, evidence included.
    pub async fn get(&self, identifier: &str) -> Result<Option<AuditResult>> {
        let row = sqlx::query(
            "SELECT identifier, verdict, detail, timestamp, files_scanned
             FROM audit_results WHERE identifier = ?",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut result = decode_result(&row)?;
                result.evidence = self.evidence(identifier).await?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Number of stored identifiers.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of results, newest first. `page` is 1-based.
    pub async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<AuditResult>> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query(
            "SELECT identifier, verdict, detail, timestamp, files_scanned
             FROM audit_results
             ORDER BY timestamp DESC, identifier ASC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut result = decode_result(row)?;
            result.evidence = self.evidence(&result.identifier).await?;
            results.push(result);
        }
        Ok(results)
    }

    /// All records flattened to rows, ordered by identifier.
    pub async fn export_rows(&self) -> Result<Vec<ExportRow>> {
        let identifiers: Vec<String> =
            sqlx::query_scalar("SELECT identifier FROM audit_results ORDER BY identifier")
                .fetch_all(&self.pool)
                .await?;

        let mut rows = Vec::new();
        for identifier in identifiers {
            if let Some(result) = self.get(&identifier).await? {
                rows.extend(to_rows(&result));
            }
        }
        Ok(rows)
    }

    /// Schema version recorded by the migration table.
    pub async fn schema_version(&self) -> Result<i64> {
        get_schema_version(&self.pool).await
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }

    async fn evidence(&self, identifier: &str) -> Result<Vec<MatchRecord>> {
        let rows = sqlx::query(
            "SELECT file_path, line_number, line_text, matched_rule
             FROM audit_evidence WHERE identifier = ? ORDER BY ordinal",
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<MatchRecord> {
                let line_number: i64 = row.try_get("line_number")?;
                Ok(MatchRecord {
                    relative_file_path: row.try_get("file_path")?,
                    line_number: u64::try_from(line_number).map_err(|_| {
                        StoreError::Decode(format!("negative line number for '{identifier}'"))
                    })?,
                    line_text: row.try_get("line_text")?,
                    matched_rule: row.try_get("matched_rule")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn already_done(&self, identifier: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM audit_results WHERE identifier = ?)",
        )
        .bind(identifier)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    async fn add_result(&self, result: &AuditResult) -> Result<()> {
        if !result.verdict.is_persisted() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM audit_evidence WHERE identifier = ?")
            .bind(&result.identifier)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO audit_results
                 (identifier, verdict, detail, timestamp, files_scanned, matches_count)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(identifier) DO UPDATE SET
                 verdict = excluded.verdict,
                 detail = excluded.detail,
                 timestamp = excluded.timestamp,
                 files_scanned = excluded.files_scanned,
                 matches_count = excluded.matches_count",
        )
        .bind(&result.identifier)
        .bind(result.verdict.kind())
        .bind(result.verdict.detail())
        .bind(result.timestamp.to_rfc3339())
        .bind(to_i64(result.files_scanned))
        .bind(to_i64(result.matches_count() as u64))
        .execute(&mut *tx)
        .await?;

        for (ordinal, record) in result.evidence.iter().enumerate() {
            sqlx::query(
                "INSERT INTO audit_evidence
                     (identifier, ordinal, file_path, line_number, line_text, matched_rule)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&result.identifier)
            .bind(to_i64(ordinal as u64))
            .bind(&record.relative_file_path)
            .bind(to_i64(record.line_number))
            .bind(&record.line_text)
            .bind(&record.matched_rule)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            identifier = %result.identifier,
            verdict = %result.verdict,
            "Stored result"
        );
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn decode_result(row: &sqlx::sqlite::SqliteRow) -> Result<AuditResult> {
    let identifier: String = row.try_get("identifier")?;
    let kind: String = row.try_get("verdict")?;
    let detail: Option<String> = row.try_get("detail")?;
    let timestamp: String = row.try_get("timestamp")?;
    let files_scanned: i64 = row.try_get("files_scanned")?;

    let verdict = match kind.as_str() {
        "Match" => Verdict::Match,
        "NoMatch" => Verdict::NoMatch,
        "Skipped" => Verdict::Skipped,
        "Error" => Verdict::Error(detail.unwrap_or_default()),
        other => {
            return Err(StoreError::Decode(format!(
                "invalid verdict '{other}' for '{identifier}'"
            )))
        }
    };
    let timestamp = Timestamp::from_rfc3339(&timestamp)
        .map_err(|e| StoreError::Decode(format!("timestamp for '{identifier}': {e}")))?;

    Ok(AuditResult {
        identifier,
        verdict,
        timestamp,
        evidence: Vec::new(),
        files_scanned: u64::try_from(files_scanned).unwrap_or(0),
    })
}
