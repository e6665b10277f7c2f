//! Paginating identifier crawler.

use crate::error::{DiscoveryError, Result};
use crate::target::{CrawlReport, CrawlTarget, StopReason};
use plugaudit_core::{DiscoveryConfig, ProgressCallback};
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transient per-crawl state.
#[derive(Debug)]
struct CrawlState {
    page: u32,
    identifiers: Vec<String>,
    seen: HashSet<String>,
    consecutive_empty_pages: u32,
    pages_fetched: u32,
}

impl CrawlState {
    fn new() -> Self {
        Self {
            page: 1,
            identifiers: Vec::new(),
            seen: HashSet::new(),
            consecutive_empty_pages: 0,
            pages_fetched: 0,
        }
    }

    fn finish(self, stop_reason: StopReason) -> CrawlReport {
        CrawlReport {
            identifiers: self.identifiers,
            stop_reason,
            pages_fetched: self.pages_fetched,
        }
    }
}

/// Discovers identifiers by paging through a listing endpoint.
///
/// One crawler may run several crawls; [`stop`](Self::stop) cancels the
/// current one and every later one.
pub struct DiscoveryCrawler {
    client: Client,
    config: DiscoveryConfig,
    pattern: Regex,
    cancel: CancellationToken,
}

impl DiscoveryCrawler {
    /// Create a crawler from the `[discovery]` configuration section.
    ///
    /// # Errors
    /// Returns `DiscoveryError::InvalidPattern` if the identifier pattern
    /// does not compile, or `DiscoveryError::Http` if the client cannot be built.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let pattern = Regex::new(&config.identifier_pattern)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            config,
            pattern,
            cancel: CancellationToken::new(),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Request cancellation. Waits and in-flight requests end immediately.
    pub fn stop(&self) {
        tracing::info!("Discovery stop requested");
        self.cancel.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled by [`stop`](Self::stop), for wiring into other tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Search by keyword, returning at most `limit` identifiers.
    ///
    /// Never fails: rate limiting, transport errors and cancellation all end
    /// the search with whatever was collected.
    pub async fn search(
        &self,
        keyword: &str,
        limit: usize,
        min_interval: Duration,
        progress: Option<ProgressCallback>,
    ) -> Vec<String> {
        self.crawl(
            &CrawlTarget::Keyword(keyword.to_string()),
            limit,
            min_interval,
            progress,
        )
        .await
        .identifiers
    }

    /// Page through `target` until a stop condition is met.
    pub async fn crawl(
        &self,
        target: &CrawlTarget,
        limit: usize,
        min_interval: Duration,
        progress: Option<ProgressCallback>,
    ) -> CrawlReport {
        let notify = |message: String| {
            tracing::debug!(target: "plugaudit::discovery", "{message}");
            if let Some(cb) = &progress {
                cb(&message);
            }
        };

        let mut state = CrawlState::new();
        if target.query().is_empty() {
            return state.finish(StopReason::EmptyQuery);
        }

        let stop_reason = loop {
            if self.is_stopped() {
                break StopReason::Cancelled;
            }
            if state.identifiers.len() >= limit {
                break StopReason::LimitReached;
            }
            if state.consecutive_empty_pages >= self.config.max_empty_pages {
                break StopReason::EmptyPages;
            }
            if state.page > self.config.max_pages {
                break StopReason::PageCeiling;
            }
            if state.page > 1 && !self.pause(min_interval).await {
                break StopReason::Cancelled;
            }

            notify(format!(
                "[page {}] Fetching {target} ({} so far)",
                state.page,
                state.identifiers.len()
            ));
            let url = target.page_url(&self.config, state.page);
            let body = match self.fetch_page(&url, min_interval, &notify).await {
                Ok(body) => body,
                Err(e) => {
                    let reason = stop_reason_for(&e);
                    notify(format!("[page {}] {e}", state.page));
                    break reason;
                }
            };
            state.pages_fetched += 1;

            let mut added = 0usize;
            for identifier in self.extract(&body) {
                if state.identifiers.len() >= limit {
                    break;
                }
                if state.seen.insert(identifier.to_string()) {
                    state.identifiers.push(identifier.to_string());
                    added += 1;
                }
            }

            if added == 0 {
                state.consecutive_empty_pages += 1;
            } else {
                state.consecutive_empty_pages = 0;
            }
            notify(format!(
                "[page {}] {added} new identifiers (total {})",
                state.page,
                state.identifiers.len()
            ));
            state.page += 1;
        };

        notify(format!(
            "Discovery finished: {} identifiers from {} pages ({stop_reason})",
            state.identifiers.len(),
            state.pages_fetched
        ));
        tracing::info!(
            target_query = %target,
            found = state.identifiers.len(),
            pages = state.pages_fetched,
            reason = %stop_reason,
            "Crawl complete"
        );
        state.finish(stop_reason)
    }

    /// Identifiers referenced by a listing page, in page order.
    pub(crate) fn extract<'a>(&'a self, body: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pattern
            .captures_iter(body)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    }

    /// Fetch one page, backing off on 429 and retrying transient failures.
    pub(crate) async fn fetch_page<F>(
        &self,
        url: &str,
        min_interval: Duration,
        notify: &F,
    ) -> Result<String>
    where
        F: Fn(String),
    {
        let attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                outcome = self.request(url) => outcome,
            };
            let retries_left = attempt + 1 < attempts;

            let delay = match outcome {
                Ok(body) => return Ok(body),
                Err(DiscoveryError::RateLimited { .. }) if retries_left => {
                    let delay = min_interval.saturating_mul(2u32.saturating_pow(attempt));
                    notify(format!(
                        "Rate limited; waiting {:.1}s before retrying",
                        delay.as_secs_f64()
                    ));
                    delay
                }
                Err(e) if retries_left && is_transient(&e) => {
                    tracing::debug!(url, attempt = attempt + 1, "Retrying page: {e}");
                    min_interval
                }
                Err(e) => return Err(e),
            };

            if !self.pause(delay).await {
                return Err(DiscoveryError::Cancelled);
            }
            attempt += 1;
        }
    }

    async fn request(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DiscoveryError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
    pub(crate) async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_stopped();
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

fn is_transient(err: &DiscoveryError) -> bool {
    match err {
        DiscoveryError::Http(_) => true,
        DiscoveryError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

fn stop_reason_for(err: &DiscoveryError) -> StopReason {
    match err {
        DiscoveryError::Cancelled => StopReason::Cancelled,
        DiscoveryError::RateLimited { .. } => StopReason::RateLimited,
        _ => StopReason::TransportError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler() -> DiscoveryCrawler {
        DiscoveryCrawler::new(DiscoveryConfig::default()).expect("crawler")
    }

    #[test]
    fn test_extract_identifiers() {
        let crawler = crawler();
        let body = r#"
            <a href="https://wordpress.org/plugins/contact-form-7/">CF7</a>
            <a href="https://wordpress.org/plugins/akismet/">Akismet</a>
            <a href="https://wordpress.org/plugins/contact-form-7/">again</a>
            <a href="https://example.com/plugins/not-this/">no</a>
        "#;
        let found: Vec<_> = crawler.extract(body).collect();
        assert_eq!(found, vec!["contact-form-7", "akismet", "contact-form-7"]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = DiscoveryConfig {
            identifier_pattern: "(unclosed".to_string(),
            ..DiscoveryConfig::default()
        };
        assert!(matches!(
            DiscoveryCrawler::new(config),
            Err(DiscoveryError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_keyword_returns_nothing() {
        let crawler = crawler();
        let report = crawler
            .crawl(
                &CrawlTarget::Keyword("   ".to_string()),
                10,
                Duration::ZERO,
                None,
            )
            .await;
        assert!(report.identifiers.is_empty());
        assert_eq!(report.stop_reason, StopReason::EmptyQuery);
        assert_eq!(report.pages_fetched, 0);
    }

    #[tokio::test]
    async fn test_stopped_crawler_stays_stopped() {
        let crawler = crawler();
        crawler.stop();
        assert!(crawler.is_stopped());
        assert!(!crawler.pause(Duration::from_secs(60)).await);

        let report = crawler
            .crawl(
                &CrawlTarget::Category("popular".to_string()),
                10,
                Duration::ZERO,
                None,
            )
            .await;
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.pages_fetched, 0);
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(
            stop_reason_for(&DiscoveryError::RateLimited { url: "u".into() }),
            StopReason::RateLimited
        );
        assert_eq!(
            stop_reason_for(&DiscoveryError::Status {
                status: 404,
                url: "u".into()
            }),
            StopReason::TransportError
        );
        assert!(is_transient(&DiscoveryError::Status {
            status: 503,
            url: "u".into()
        }));
        assert!(!is_transient(&DiscoveryError::Status {
            status: 403,
            url: "u".into()
        }));
    }
}
