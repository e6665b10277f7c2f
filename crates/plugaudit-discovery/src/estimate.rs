//! Best-effort total count estimate.
//!
//! Probes pages 1, 2, 4, 8, ... until one is empty, then binary-searches
//! between the last non-empty and the first empty page.

use crate::crawler::DiscoveryCrawler;
use crate::error::DiscoveryError;
use crate::target::CrawlTarget;
use plugaudit_core::ProgressCallback;
use std::time::Duration;

/// Result of probing one page.
enum Probe {
    Items(usize),
    Empty,
    Cancelled,
}

impl DiscoveryCrawler {
    /// Estimate the number of items listed under `target`.
    ///
    /// Returns `last_page × items_per_page`, `Some(0)` when the first page is
    /// empty, and `None` when the first page is unreachable, no empty page
    /// exists below the probe ceiling, or the crawler is stopped.
    pub async fn estimate_total(
        &self,
        target: &CrawlTarget,
        min_interval: Duration,
        progress: Option<ProgressCallback>,
    ) -> Option<u64> {
        let notify = |message: String| {
            tracing::debug!(target: "plugaudit::discovery", "{message}");
            if let Some(cb) = &progress {
                cb(&message);
            }
        };

        notify(format!("Estimating size of {target}"));

        match self.probe(target, 1, min_interval).await {
            Ok(Probe::Items(_)) => {}
            Ok(Probe::Empty) => return Some(0),
            Ok(Probe::Cancelled) | Err(_) => {
                notify("Estimation failed: first page unavailable".to_string());
                return None;
            }
        }

        let ceiling = self.config().probe_ceiling.max(1);
        let mut low: u32 = 1;
        let mut high: Option<u32> = None;
        let mut page: u32 = 2;

        while page <= ceiling {
            if !self.pause(min_interval).await {
                return None;
            }
            notify(format!("Probing page {page}"));
            match self.probe(target, page, min_interval).await {
                Ok(Probe::Items(count)) => {
                    notify(format!("Page {page} has {count} items"));
                    low = page;
                    page = page.saturating_mul(2);
                }
                Ok(Probe::Cancelled) => return None,
                Ok(Probe::Empty) | Err(_) => {
                    notify(format!("Page {page} is empty"));
                    high = Some(page);
                    break;
                }
            }
        }

        let Some(mut high) = high else {
            notify(format!("Estimation gave up: page {low} still has items"));
            return None;
        };

        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if !self.pause(min_interval).await {
                return None;
            }
            notify(format!("Binary search: testing page {mid}"));
            match self.probe(target, mid, min_interval).await {
                Ok(Probe::Items(_)) => low = mid,
                Ok(Probe::Cancelled) => return None,
                Ok(Probe::Empty) | Err(_) => high = mid,
            }
        }

        let estimate = u64::from(low) * self.config().items_per_page;
        notify(format!("Estimation complete: ~{estimate} items ({low} pages)"));
        Some(estimate)
    }

    async fn probe(
        &self,
        target: &CrawlTarget,
        page: u32,
        min_interval: Duration,
    ) -> Result<Probe, DiscoveryError> {
        let url = target.page_url(self.config(), page);
        let quiet = |message: String| tracing::debug!("{message}");
        match self.fetch_page(&url, min_interval, &quiet).await {
            Ok(body) => {
                let count = self.extract(&body).count();
                Ok(if count == 0 {
                    Probe::Empty
                } else {
                    Probe::Items(count)
                })
            }
            Err(DiscoveryError::Cancelled) => Ok(Probe::Cancelled),
            Err(e) => Err(e),
        }
    }
}
