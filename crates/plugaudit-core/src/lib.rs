//! Plugaudit Core - Foundation crate for the plugin audit pipeline.
//!
//! This crate provides the shared types, error handling and configuration
//! management that all other plugaudit crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes and enums (`Identifier`, `Verdict`, `AuditResult`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use plugaudit_core::{AppConfig, AuditResult, Identifier, Verdict};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.pipeline.max_workers, 8);
//!
//! let id = Identifier::parse("  contact-form-7 ")?;
//! let result = AuditResult::new(id.as_str(), Verdict::NoMatch, Vec::new(), 12);
//! assert_eq!(result.identifier, "contact-form-7");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, DiscoveryConfig, PipelineConfig, RetrievalConfig, RuleConfig, ScanningConfig,
    StorageBackend, StorageConfig,
};
pub use error::{AuditError, ConfigError, ConfigResult, Result};
pub use types::{
    log_progress, AuditResult, Identifier, MatchRecord, ProgressCallback, Timestamp, Verdict,
};
