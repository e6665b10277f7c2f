//! Audit orchestrator.
//!
//! `AuditOrchestrator` drives each identifier through
//! `Pending → Retrieving → Scanning → Reporting → Done`, short-circuiting to
//! `Skipped` when the store already holds a result and to `Failed` when
//! retrieval or scanning fails. At most `max_workers` audits are in flight;
//! store writes and progress notifications happen on the driving task in
//! completion order. Cancelling the run stops new audits from starting while
//! the ones already in flight finish and release their scratch space.

use crate::archive::SourceArchiver;
use crate::error::PipelineError;
use futures::stream::{FuturesUnordered, StreamExt};
use plugaudit_core::{log_progress, AuditResult, Identifier, ProgressCallback};
use plugaudit_db::ResultStore;
use plugaudit_fetch::BundleRetriever;
use plugaudit_signatures::SignatureScanner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of audits kept in flight.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Detail recorded for blank input identifiers.
const EMPTY_IDENTIFIER: &str = "empty identifier";

/// Running count for progress messages.
struct Tally {
    total: usize,
    reported: usize,
}

impl Tally {
    fn message(&mut self, result: &AuditResult) -> String {
        self.reported += 1;
        format!(
            "[{}/{}] {}: {} (remaining {})",
            self.reported,
            self.total,
            result.identifier,
            result.verdict,
            self.total - self.reported
        )
    }
}

/// Coordinates retrieval, scanning and reporting for a batch of identifiers.
pub struct AuditOrchestrator {
    retriever: Arc<dyn BundleRetriever>,
    scanner: Arc<SignatureScanner>,
    store: Arc<dyn ResultStore>,
    archiver: Option<Arc<SourceArchiver>>,
    progress: ProgressCallback,
    max_workers: usize,
    cancel: CancellationToken,
}

impl AuditOrchestrator {
    /// Create an orchestrator with default concurrency and a logging progress sink.
    #[must_use]
    pub fn new(
        retriever: Arc<dyn BundleRetriever>,
        scanner: Arc<SignatureScanner>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            retriever,
            scanner,
            store,
            archiver: None,
            progress: log_progress(),
            max_workers: DEFAULT_MAX_WORKERS,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops launching new audits; in-flight audits are drained.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Set the maximum number of concurrent audits (at least one).
    #[must_use]
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Replace the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Archive the sources of every scanned bundle.
    #[must_use]
    pub fn with_archiver(mut self, archiver: SourceArchiver) -> Self {
        self.archiver = Some(Arc::new(archiver));
        self
    }

    /// Audit every identifier and return one result per input, in completion order.
    ///
    /// Never fails as a whole: retrieval and scan failures become `Error`
    /// verdicts and store failures are logged and reported. After cancellation
    /// only the identifiers already started produce results.
    pub async fn run<S: AsRef<str>>(&self, identifiers: &[S]) -> Vec<AuditResult> {
        if identifiers.is_empty() {
            (self.progress)("Nothing to do: no identifiers given");
            return Vec::new();
        }

        let mut tally = Tally {
            total: identifiers.len(),
            reported: 0,
        };
        let mut results = Vec::with_capacity(identifiers.len());
        let mut in_flight = FuturesUnordered::new();

        tracing::info!(
            total = identifiers.len(),
            max_workers = self.max_workers,
            "Starting audit run"
        );

        for raw in identifiers {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    in_flight = in_flight.len(),
                    not_started = tally.total - results.len() - in_flight.len(),
                    "Run cancelled, draining in-flight audits"
                );
                break;
            }

            let Ok(identifier) = Identifier::parse(raw.as_ref()) else {
                tracing::debug!("Pending -> Failed: {EMPTY_IDENTIFIER}");
                let result = AuditResult::failed(raw.as_ref().trim(), EMPTY_IDENTIFIER);
                self.notify(&mut tally, &result);
                results.push(result);
                continue;
            };

            match self.store.already_done(identifier.as_str()).await {
                Ok(true) => {
                    tracing::debug!(identifier = %identifier, "Pending -> Skipped");
                    let result = AuditResult::skipped(identifier.as_str());
                    self.notify(&mut tally, &result);
                    results.push(result);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        identifier = %identifier,
                        "Could not check for a previous result, auditing anyway: {e}"
                    );
                }
            }

            in_flight.push(self.audit(identifier));

            // Respect concurrency limit
            while in_flight.len() >= self.max_workers {
                if let Some(result) = in_flight.next().await {
                    self.report(result, &mut tally, &mut results).await;
                }
            }
        }

        while let Some(result) = in_flight.next().await {
            self.report(result, &mut tally, &mut results).await;
        }

        tracing::info!(completed = results.len(), "Audit run finished");
        results
    }

    /// Retrieve and scan one bundle. Scratch space is released before returning.
    async fn audit(&self, identifier: Identifier) -> AuditResult {
        tracing::debug!(identifier = %identifier, "Pending -> Retrieving");
        let bundle = match self.retriever.fetch(&identifier).await {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(identifier = %identifier, "Retrieving -> Failed: {e}");
                return AuditResult::failed(identifier.as_str(), PipelineError::from(e).to_string());
            }
        };

        tracing::debug!(identifier = %identifier, "Retrieving -> Scanning");
        let scanner = Arc::clone(&self.scanner);
        let archiver = self.archiver.clone();
        let id = identifier.as_str().to_string();

        let scanned = tokio::task::spawn_blocking(move || {
            let outcome = scanner.scan(bundle.root());
            if let Some(archiver) = archiver {
                if let Err(e) = archiver.archive(&id, bundle.root(), &scanner) {
                    tracing::warn!(identifier = %id, "Failed to archive sources: {e}");
                }
            }
            if let Err(e) = bundle.close() {
                tracing::warn!(identifier = %id, "Failed to remove scratch directory: {e}");
            }
            outcome
        })
        .await;

        match scanned {
            Ok(outcome) => {
                tracing::debug!(
                    identifier = %identifier,
                    files = outcome.files_scanned,
                    matches = outcome.matches.len(),
                    "Scanning -> Reporting"
                );
                AuditResult::from_scan(identifier.as_str(), outcome.matches, outcome.files_scanned)
            }
            Err(e) => {
                let err = PipelineError::from(e);
                tracing::error!(identifier = %identifier, "Scanning -> Failed: {err}");
                AuditResult::failed(identifier.as_str(), err.to_string())
            }
        }
    }

    /// Persist a finished audit and emit its progress line.
    async fn report(&self, result: AuditResult, tally: &mut Tally, results: &mut Vec<AuditResult>) {
        if result.verdict.is_persisted() {
            if let Err(e) = self.store.add_result(&result).await {
                let err = PipelineError::from(e);
                tracing::error!(identifier = %result.identifier, "Failed to store result: {err}");
                (self.progress)(&format!(
                    "Failed to store result for {}: {err}",
                    result.identifier
                ));
            }
        }
        tracing::debug!(identifier = %result.identifier, verdict = %result.verdict, "-> Done");
        self.notify(tally, &result);
        results.push(result);
    }

    fn notify(&self, tally: &mut Tally, result: &AuditResult) {
        let message = tally.message(result);
        (self.progress)(&message);
    }
}
