//! Archive extraction into scratch directories.

use crate::error::{RetrievalError, Result};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An extracted bundle.
///
/// Owns the scratch directory it was unpacked into; the directory and
/// everything below it is removed when the bundle is dropped.
#[derive(Debug)]
pub struct FetchedBundle {
    root: PathBuf,
    scratch: TempDir,
}

impl FetchedBundle {
    /// Wrap an existing scratch directory. `root` should live inside `scratch`.
    #[must_use]
    pub fn from_parts(scratch: TempDir, root: PathBuf) -> Self {
        Self { root, scratch }
    }

    /// The bundle's single top-level directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The scratch directory holding the extraction.
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Remove the scratch directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        self.scratch.close().map_err(RetrievalError::from)
    }
}

/// Create a fresh scratch directory, under `parent` when given.
pub fn scratch_dir(parent: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("plugaudit-");
    let dir = match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Unpack a zip archive into `scratch` and locate its single root folder.
///
/// Entry names that would escape `scratch` are rejected by the zip reader.
///
/// # Errors
/// `RetrievalError::Archive` if the payload is not a zip archive or does
/// not contain exactly one top-level directory.
pub fn extract_bundle<R: Read + Seek>(reader: R, scratch: TempDir) -> Result<FetchedBundle> {
    let mut archive = zip::ZipArchive::new(reader)?;
    archive.extract(scratch.path())?;

    let mut top_level = Vec::new();
    for entry in std::fs::read_dir(scratch.path())? {
        top_level.push(entry?);
    }

    match top_level.as_slice() {
        [only] if only.file_type()?.is_dir() => {
            let root = only.path();
            tracing::debug!(
                "Extracted {} entries to {}",
                archive.len(),
                root.display()
            );
            Ok(FetchedBundle::from_parts(scratch, root))
        }
        [only] => Err(RetrievalError::Archive(format!(
            "top-level entry '{}' is not a directory",
            only.file_name().to_string_lossy()
        ))),
        [] => Err(RetrievalError::Archive("archive is empty".to_string())),
        many => Err(RetrievalError::Archive(format!(
            "expected one top-level directory, found {}",
            many.len()
        ))),
    }
}
