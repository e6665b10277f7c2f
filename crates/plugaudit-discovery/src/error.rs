//! Discovery error types.

use thiserror::Error;

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Failures while crawling listing pages.
///
/// Only [`DiscoveryError::InvalidPattern`] and client construction failures
/// escape the crawler; everything else ends a crawl early with partial results.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Transport failure (connect, timeout, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The endpoint kept answering 429 Too Many Requests
    #[error("rate limited fetching {url}")]
    RateLimited {
        /// Requested URL
        url: String,
    },

    /// The identifier pattern does not compile
    #[error("invalid identifier pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The crawl was stopped
    #[error("crawl cancelled")]
    Cancelled,
}
