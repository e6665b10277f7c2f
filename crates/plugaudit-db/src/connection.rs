//! `SQLite` connection pool setup.

use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Open a connection pool for the database at `path`.
///
/// `:memory:` opens a private in-memory database shared by the pool's
/// connections. File databases are created if missing, including parent
/// directories.
///
/// # Errors
/// Returns `StoreError::Open` if the path is unusable or no connection can be made.
pub async fn connect(path: impl AsRef<Path>) -> Result<Pool<Sqlite>> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| StoreError::Open("invalid database path: not valid UTF-8".to_string()))?;

    let base_options = if path_str == ":memory:" {
        SqliteConnectOptions::from_str(path_str)
            .map_err(|e| StoreError::Open(format!("invalid connection string: {e}")))?
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
    };
    let connect_options = base_options.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .map_err(|e| StoreError::Open(format!("failed to open {path_str}: {e}")))?;

    tracing::info!("Database pool created at {}", path_str);
    Ok(pool)
}
