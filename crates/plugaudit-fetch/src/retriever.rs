//! Bundle retrieval over HTTP.

use crate::error::{RetrievalError, Result};
use crate::extract::{extract_bundle, scratch_dir, FetchedBundle};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use plugaudit_core::{Identifier, RetrievalConfig};
use reqwest::Client;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

/// Source of extracted bundles.
#[async_trait]
pub trait BundleRetriever: Send + Sync {
    /// Fetch and extract the bundle named by `identifier`.
    ///
    /// The returned bundle owns its scratch space.
    async fn fetch(&self, identifier: &Identifier) -> Result<FetchedBundle>;
}

/// Downloads zip bundles from a URL template and unpacks them locally.
pub struct HttpRetriever {
    client: Client,
    url_template: String,
    retry: RetryPolicy,
    scratch_root: Option<PathBuf>,
}

impl HttpRetriever {
    /// Create a retriever from the `[retrieval]` configuration section.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            url_template: config.bundle_url_template.clone(),
            retry: RetryPolicy::from_config(config),
            scratch_root: config.scratch_dir.clone(),
        })
    }

    /// Replace the URL template. `{slug}` is substituted with the identifier.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Download URL for an identifier.
    #[must_use]
    pub fn bundle_url(&self, identifier: &Identifier) -> String {
        self.url_template
            .replace("{slug}", &urlencoding::encode(identifier.as_str()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl BundleRetriever for HttpRetriever {
    async fn fetch(&self, identifier: &Identifier) -> Result<FetchedBundle> {
        let url = self.bundle_url(identifier);
        tracing::debug!(identifier = %identifier, url = %url, "Downloading bundle");

        let bytes = self
            .retry
            .run(|attempt| {
                if attempt > 0 {
                    tracing::info!(identifier = %identifier, attempt, "Retrying download");
                }
                self.download(&url)
            })
            .await?;

        let scratch_root = self.scratch_root.clone();
        tokio::task::spawn_blocking(move || {
            let scratch = scratch_dir(scratch_root.as_deref())?;
            extract_bundle(Cursor::new(bytes), scratch)
        })
        .await?
    }
}
