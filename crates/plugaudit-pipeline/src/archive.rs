//! Archival of scanned bundle sources.
//!
//! When enabled, the scanner-eligible files of every fetched bundle are
//! copied to `<archive_dir>/<identifier>/` before the scratch directory is
//! released, so matches can be reviewed after the run.

use crate::error::{PipelineError, Result};
use plugaudit_core::{AuditResult, PipelineConfig, Verdict};
use plugaudit_signatures::SignatureScanner;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Copies bundle sources into a per-identifier archive directory.
#[derive(Debug, Clone)]
pub struct SourceArchiver {
    archive_dir: PathBuf,
}

impl SourceArchiver {
    /// Archive into `archive_dir`, created on first use.
    #[must_use]
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    /// Build from the `[pipeline]` section; `None` when `save_sources` is off.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        config
            .save_sources
            .then(|| Self::new(config.archive_dir.clone()))
    }

    /// Archive root.
    #[must_use]
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Directory holding the archived sources of `identifier`.
    #[must_use]
    pub fn destination(&self, identifier: &str) -> PathBuf {
        self.archive_dir.join(identifier)
    }

    /// Copy the files of `root` that `scanner` would read, replacing any
    /// earlier copy. Returns the number of files copied.
    pub fn archive(
        &self,
        identifier: &str,
        root: &Path,
        scanner: &SignatureScanner,
    ) -> Result<usize> {
        check_component(identifier)?;
        let destination = self.destination(identifier);
        if destination.exists() {
            fs::remove_dir_all(&destination)?;
        }
        fs::create_dir_all(&destination)?;

        let mut copied = 0;
        for file in scanner.gather_files(root) {
            let Ok(relative) = file.strip_prefix(root) else {
                continue;
            };
            let target = destination.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file, &target)?;
            copied += 1;
        }

        tracing::debug!(identifier, copied, "Archived bundle sources");
        Ok(copied)
    }

    /// Remove archived sources whose identifier has no `Match` verdict in
    /// `results`. Returns the number of directories removed.
    pub fn retain_matches(&self, results: &[AuditResult]) -> Result<usize> {
        if !self.archive_dir.exists() {
            return Ok(0);
        }
        let keep: HashSet<&str> = results
            .iter()
            .filter(|r| r.verdict == Verdict::Match)
            .map(|r| r.identifier.as_str())
            .collect();

        let mut removed = 0;
        for entry in fs::read_dir(&self.archive_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if keep.contains(name.to_string_lossy().as_ref()) {
                continue;
            }
            fs::remove_dir_all(entry.path())?;
            tracing::info!("Removed archived sources of {}", name.to_string_lossy());
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete every archived bundle.
    pub fn clear(&self) -> Result<()> {
        if self.archive_dir.exists() {
            fs::remove_dir_all(&self.archive_dir)?;
            tracing::info!(dir = %self.archive_dir.display(), "Cleared archived sources");
        }
        Ok(())
    }
}

/// Identifiers become directory names; reject anything that is not a single component.
fn check_component(identifier: &str) -> Result<()> {
    let invalid = identifier.is_empty()
        || identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\']);
    if invalid {
        return Err(PipelineError::Archive(format!(
            "identifier '{identifier}' is not a valid directory name"
        )));
    }
    Ok(())
}
