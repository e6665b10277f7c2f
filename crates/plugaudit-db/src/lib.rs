//! Plugaudit Result Stores
//!
//! Durable, idempotent storage of per-identifier audit verdicts. Every
//! backend implements [`ResultStore`], whose two operations are all the
//! orchestrator needs: "was this identifier already processed?" and
//! "insert or replace this identifier's result".
//!
//! # Backends
//!
//! - [`SqliteStore`] - embedded `SQLite` via `SQLx` with embedded migrations
//! - [`CsvStore`] - a single CSV file rewritten atomically on each write
//! - [`MemoryStore`] - process-local map, for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use plugaudit_db::{open_store, ResultStore};
//!
//! let store = open_store(&config.storage).await?;
//! if !store.already_done("akismet").await? {
//!     store.add_result(&result).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod csv_file;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod record;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use csv_file::CsvStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use record::{from_rows, to_rows, ExportRow};
pub use sqlite::SqliteStore;
pub use store::{open_store, ResultStore};
