//! Identifier discovery.
//!
//! Pages through a remote search or category listing and extracts bundle
//! identifiers with a configurable pattern. Crawls are rate limited, back
//! off exponentially on HTTP 429, stop on a set of heuristics and can be
//! cancelled at any time. Every failure ends a crawl with the identifiers
//! collected so far.
//!
//! # Example
//!
//! ```ignore
//! use plugaudit_discovery::DiscoveryCrawler;
//! use std::time::Duration;
//!
//! let crawler = DiscoveryCrawler::new(config.discovery.clone())?;
//! let slugs = crawler.search("upload", 100, Duration::from_secs(1), None).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crawler;
pub mod error;
mod estimate;
pub mod target;

pub use crawler::DiscoveryCrawler;
pub use error::{DiscoveryError, Result};
pub use target::{CrawlReport, CrawlTarget, StopReason};
