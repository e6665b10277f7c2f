//! Crawl targets and outcomes.

use plugaudit_core::DiscoveryConfig;
use std::fmt;

/// What to paginate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlTarget {
    /// Keyword search results
    Keyword(String),
    /// A listing category such as `popular` or `new`
    Category(String),
}

impl CrawlTarget {
    /// The keyword or category name, trimmed.
    #[must_use]
    pub fn query(&self) -> &str {
        match self {
            Self::Keyword(q) | Self::Category(q) => q.trim(),
        }
    }

    /// URL of listing page `page` (1-based).
    #[must_use]
    pub fn page_url(&self, config: &DiscoveryConfig, page: u32) -> String {
        let query = urlencoding::encode(self.query());
        let template = match self {
            Self::Keyword(_) => config.search_url_template.replace("{kw}", &query),
            Self::Category(_) => config.category_url_template.replace("{category}", &query),
        };
        template.replace("{page}", &page.to_string())
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword(q) => write!(f, "search '{}'", q.trim()),
            Self::Category(c) => write!(f, "category '{}'", c.trim()),
        }
    }
}

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Cancelled,
    /// The requested number of identifiers was collected
    LimitReached,
    /// Too many consecutive pages yielded nothing new
    EmptyPages,
    /// The page ceiling was reached
    PageCeiling,
    /// The endpoint kept rate limiting after all backoff attempts
    RateLimited,
    /// A non-retryable request failure
    TransportError,
    /// Nothing to search for
    EmptyQuery,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Cancelled => "cancelled",
            Self::LimitReached => "limit reached",
            Self::EmptyPages => "no new identifiers",
            Self::PageCeiling => "page ceiling reached",
            Self::RateLimited => "rate limited",
            Self::TransportError => "request failed",
            Self::EmptyQuery => "empty query",
        };
        f.write_str(text)
    }
}

/// Outcome of one crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    /// Identifiers in first-seen order, without duplicates
    pub identifiers: Vec<String>,
    /// Why the crawl ended
    pub stop_reason: StopReason,
    /// Listing pages successfully fetched
    pub pages_fetched: u32,
}
