//! Plugaudit Pipeline - Audit orchestration.
//!
//! Runs a batch of identifiers through retrieval, signature scanning and
//! reporting with bounded concurrency. Failures are isolated per identifier;
//! a run always yields one result per input.
//!
//! # Example
//!
//! ```rust,ignore
//! use plugaudit_pipeline::AuditOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = AuditOrchestrator::new(
//!     Arc::new(retriever),
//!     Arc::new(scanner),
//!     store,
//! )
//! .with_max_workers(config.pipeline.max_workers);
//!
//! let results = orchestrator.run(&["contact-form-7", "akismet"]).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod archive;
#[allow(missing_docs)]
pub mod error;
pub mod orchestrator;

// Re-export commonly used types
pub use archive::SourceArchiver;
pub use error::{PipelineError, Result};
pub use orchestrator::{AuditOrchestrator, DEFAULT_MAX_WORKERS};
