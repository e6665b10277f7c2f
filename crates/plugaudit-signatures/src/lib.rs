//! Signature scanning for extracted plugin bundles.
//!
//! Walks a bundle tree, applies named byte-pattern rules to files with an
//! allow-listed extension and reports every hit with file/line provenance.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod rules;
pub mod scanner;

pub use rules::{upload_rule, ScanRule, SignatureError};
pub use scanner::{ScanOutcome, SignatureScanner, BINARY_CONTENT_SENTINEL, DEFAULT_EXTENSIONS};
