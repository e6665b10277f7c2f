//! Plugaudit application shell
//!
//! Thin binary glue: loads configuration, opens the result store, optionally
//! discovers identifiers and hands them to the audit pipeline.
//! Core business logic lives in the `crates/` directory.

mod args;

pub use args::{Invocation, USAGE};

use anyhow::{Context, Result};
use plugaudit_core::{log_progress, AppConfig, AuditResult, StorageBackend};
use plugaudit_db::{from_rows, open_store, CsvStore, SqliteStore};
use plugaudit_discovery::{CrawlTarget, DiscoveryCrawler};
use plugaudit_fetch::HttpRetriever;
use plugaudit_pipeline::{AuditOrchestrator, SourceArchiver};
use plugaudit_signatures::SignatureScanner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Exit status after an interrupt.
const EXIT_INTERRUPTED: i32 = 130;

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plugaudit=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Load configuration and execute `invocation`. Returns the process exit status.
pub async fn run(invocation: Invocation) -> Result<i32> {
    if invocation.init_config {
        return init_config();
    }

    let mut config = AppConfig::load_with_env().context("failed to load configuration")?;
    if let Some(save) = invocation.save_sources {
        config.pipeline.save_sources = save;
    }
    run_with_config(&invocation, &config).await
}

/// Execute `invocation` against an already loaded configuration.
pub async fn run_with_config(invocation: &Invocation, config: &AppConfig) -> Result<i32> {
    info!("Starting Plugaudit v{}", env!("CARGO_PKG_VERSION"));

    if invocation.estimate {
        return estimate(invocation, config).await;
    }

    if invocation.clear_sources {
        clear_sources(config).await?;
    }

    let mut slugs = invocation.slugs.clone();
    if invocation.discovers() {
        for slug in discover(invocation, config).await? {
            if !slugs.contains(&slug) {
                slugs.push(slug);
            }
        }
    }

    if slugs.is_empty() && !invocation.cleanup && !invocation.clear_sources {
        eprintln!("Nothing to audit; supply slugs or --search <kw>.");
        eprintln!("{USAGE}");
        return Ok(1);
    }

    if !slugs.is_empty() {
        let Some(results) = audit(&slugs, config).await? else {
            return Ok(EXIT_INTERRUPTED);
        };
        summarize(&results);
    }

    if invocation.cleanup {
        cleanup(config).await?;
    }
    Ok(0)
}

/// Write a default config rooted at the platform data directory, unless one exists.
fn init_config() -> Result<i32> {
    let path = AppConfig::config_path()?;
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(0);
    }

    let config = AppConfig::default().rooted_at(&AppConfig::data_dir()?);
    config.save().context("failed to write configuration")?;
    println!("Wrote {}", path.display());
    Ok(0)
}

/// Delete every archived source tree.
async fn clear_sources(config: &AppConfig) -> Result<()> {
    let archiver = SourceArchiver::new(config.pipeline.archive_dir.clone());
    tokio::task::spawn_blocking(move || archiver.clear()).await??;
    Ok(())
}

fn targets(invocation: &Invocation) -> Vec<CrawlTarget> {
    let mut targets = Vec::new();
    if let Some(keyword) = &invocation.search {
        targets.push(CrawlTarget::Keyword(keyword.clone()));
    }
    if let Some(category) = &invocation.category {
        targets.push(CrawlTarget::Category(category.clone()));
    }
    targets
}

/// Crawl every requested listing. Ctrl-C stops discovery and keeps what was found.
async fn discover(invocation: &Invocation, config: &AppConfig) -> Result<Vec<String>> {
    let crawler =
        DiscoveryCrawler::new(config.discovery.clone()).context("invalid discovery configuration")?;
    let interval = Duration::from_millis(config.discovery.min_interval_ms);

    let stopper = crawler.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping discovery");
            stopper.cancel();
        }
    });

    let mut found = Vec::new();
    for target in targets(invocation) {
        let report = crawler
            .crawl(
                &target,
                config.discovery.default_limit,
                interval,
                Some(log_progress()),
            )
            .await;
        info!(
            "Added {} slugs from {target} ({})",
            report.identifiers.len(),
            report.stop_reason
        );
        found.extend(report.identifiers);
        if crawler.is_stopped() {
            break;
        }
    }

    watcher.abort();
    Ok(found)
}

async fn estimate(invocation: &Invocation, config: &AppConfig) -> Result<i32> {
    let targets = targets(invocation);
    if targets.is_empty() {
        eprintln!("--estimate needs --search or --category");
        return Ok(2);
    }

    let crawler =
        DiscoveryCrawler::new(config.discovery.clone()).context("invalid discovery configuration")?;
    let interval = Duration::from_millis(config.discovery.min_interval_ms);
    for target in targets {
        match crawler
            .estimate_total(&target, interval, Some(log_progress()))
            .await
        {
            Some(total) => println!("{target}: ~{total} plugins"),
            None => println!("{target}: unknown"),
        }
    }
    Ok(0)
}

/// Run the pipeline. Returns `None` when interrupted.
///
/// Ctrl-C stops new audits from starting; the ones in flight finish, are
/// stored and release their scratch directories before this returns.
async fn audit(slugs: &[String], config: &AppConfig) -> Result<Option<Vec<AuditResult>>> {
    let store = open_store(&config.storage)
        .await
        .context("failed to open result store")?;
    let retriever = HttpRetriever::new(&config.retrieval).context("failed to create HTTP client")?;
    let scanner = SignatureScanner::from_config(&config.scanning).context("invalid scan rules")?;

    let mut orchestrator = AuditOrchestrator::new(Arc::new(retriever), Arc::new(scanner), store)
        .with_max_workers(config.pipeline.max_workers);
    if let Some(archiver) = SourceArchiver::from_config(&config.pipeline) {
        info!(dir = %archiver.archive_dir().display(), "Archiving scanned sources");
        orchestrator = orchestrator.with_archiver(archiver);
    }

    let stopper = orchestrator.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight audits");
            stopper.cancel();
        }
    });

    let results = orchestrator.run(slugs).await;
    watcher.abort();

    if orchestrator.is_cancelled() {
        warn!(
            completed = results.len(),
            "Interrupted; completed results have been stored"
        );
        return Ok(None);
    }
    Ok(Some(results))
}

fn summarize(results: &[AuditResult]) {
    let count = |kind: &str| results.iter().filter(|r| r.verdict.kind() == kind).count();
    info!(
        total = results.len(),
        matched = count("Match"),
        clean = count("NoMatch"),
        skipped = count("Skipped"),
        failed = count("Error"),
        "Audit complete"
    );
}

/// Remove archived sources of every identifier whose stored verdict is not `Match`.
async fn cleanup(config: &AppConfig) -> Result<()> {
    let rows = match config.storage.backend {
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(&config.storage.path).await?;
            let rows = store.export_rows().await?;
            store.close().await;
            rows
        }
        StorageBackend::Csv => CsvStore::open(&config.storage.path).await?.export_rows().await,
        StorageBackend::Memory => {
            warn!("Memory store keeps no results between runs; skipping cleanup");
            return Ok(());
        }
    };
    let results = from_rows(rows)?;

    let archiver = SourceArchiver::new(config.pipeline.archive_dir.clone());
    let removed = tokio::task::spawn_blocking(move || archiver.retain_matches(&results)).await??;
    info!(removed, "Pruned archived sources without matches");
    Ok(())
}
