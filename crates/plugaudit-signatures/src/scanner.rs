//! Bundle tree scanner.
//!
//! Applies a fixed set of [`ScanRule`]s to every allow-listed file below a
//! bundle root. Text files are matched line by line; files that are not valid
//! UTF-8 are matched as a single byte blob.

use crate::rules::{ScanRule, SignatureError};
use plugaudit_core::{MatchRecord, ScanningConfig};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions scanned when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["php", "js", "html", "twig"];

/// `line_text` recorded for hits in non-text content.
pub const BINARY_CONTENT_SENTINEL: &str = "<binary content>";

/// Maximum file size to scan (100MB)
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Result of scanning one bundle tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Hits in walk order (files sorted by name, lines ascending)
    pub matches: Vec<MatchRecord>,
    /// Number of eligible files that could be opened
    pub files_scanned: u64,
}

impl ScanOutcome {
    /// Whether any rule matched.
    #[must_use]
    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Scanner over a fixed rule set and extension allow-list.
#[derive(Debug, Clone)]
pub struct SignatureScanner {
    rules: Vec<ScanRule>,
    extensions: Vec<String>,
    max_file_size: u64,
}

impl SignatureScanner {
    /// Create a scanner with the default extension allow-list.
    #[must_use]
    pub fn new(rules: Vec<ScanRule>) -> Self {
        Self {
            rules,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            max_file_size: MAX_FILE_SIZE,
        }
    }

    /// Build a scanner from the `[scanning]` configuration section.
    ///
    /// # Errors
    /// Returns `SignatureError::InvalidPattern` if a configured rule does not compile.
    pub fn from_config(config: &ScanningConfig) -> Result<Self, SignatureError> {
        let scanner = Self::new(ScanRule::from_config(&config.rules)?)
            .with_max_file_size(config.max_file_size);
        if config.extensions.is_empty() {
            return Ok(scanner);
        }
        Ok(scanner.with_extensions(&config.extensions))
    }

    /// Replace the extension allow-list (case-insensitive, leading dots ignored).
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Skip files larger than `bytes`.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Check if a file should be scanned based on its extension.
    #[must_use]
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    /// Every eligible regular file under `root`, sorted by path.
    #[must_use]
    pub fn gather_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_eligible(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }

    /// Scan the tree rooted at `root`.
    ///
    /// Per-file I/O failures are logged and skipped; they never abort the scan.
    #[must_use]
    pub fn scan(&self, root: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for path in self.gather_files(root) {
            let Some(data) = self.read_file(&path) else {
                continue;
            };
            outcome.files_scanned += 1;
            let relative = relative_path(root, &path);
            outcome
                .matches
                .extend(self.match_content(&relative, &data, false));
        }

        debug!(
            root = %root.display(),
            files = outcome.files_scanned,
            matches = outcome.matches.len(),
            "scan complete"
        );
        outcome
    }

    /// True iff [`scan`](Self::scan) would report at least one match.
    ///
    /// Stops at the first hit.
    #[must_use]
    pub fn has_any_match(&self, root: &Path) -> bool {
        self.gather_files(root).iter().any(|path| {
            self.read_file(path).is_some_and(|data| {
                !self
                    .match_content(&relative_path(root, path), &data, true)
                    .is_empty()
            })
        })
    }

    /// Open and read one file. `None` means the file was not opened.
    fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() > self.max_file_size => {
                debug!(
                    "Skipping large file ({}MB): {}",
                    metadata.len() / 1024 / 1024,
                    path.display()
                );
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Failed to read metadata for {}: {}", path.display(), e);
                return None;
            }
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                debug!("Failed to open {}: {}", path.display(), e);
                return None;
            }
        };

        let mut data = Vec::new();
        if let Err(e) = file.read_to_end(&mut data) {
            // Opened but unreadable: counted, but nothing to match.
            warn!("Failed to read file {}: {}", path.display(), e);
            data.clear();
        }
        Some(data)
    }

    /// Match every rule against one file's content.
    ///
    /// Each rule reports at most one hit per text file; a binary file reports at most one hit.
    fn match_content(&self, relative: &str, data: &[u8], first_only: bool) -> Vec<MatchRecord> {
        let mut records = Vec::new();

        // Binary content yields at most one record, attributed to the first hitting rule.
        if std::str::from_utf8(data).is_err() {
            if let Some(rule) = self.rules.iter().find(|rule| rule.is_match(data)) {
                records.push(MatchRecord {
                    relative_file_path: relative.to_string(),
                    line_number: 0,
                    line_text: BINARY_CONTENT_SENTINEL.to_string(),
                    matched_rule: rule.name().to_string(),
                });
            }
            return records;
        }

        let mut matched = vec![false; self.rules.len()];
        for (index, line) in data.split(|b| *b == b'\n').enumerate() {
            if matched.iter().all(|done| *done) {
                break;
            }
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            for (rule, done) in self.rules.iter().zip(matched.iter_mut()) {
                if *done || !rule.is_match(line) {
                    continue;
                }
                *done = true;
                records.push(MatchRecord {
                    relative_file_path: relative.to_string(),
                    line_number: index as u64 + 1,
                    line_text: String::from_utf8_lossy(line).trim().to_string(),
                    matched_rule: rule.name().to_string(),
                });
                if first_only {
                    return records;
                }
            }
        }
        records
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{upload_rule, ScanRule};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
        fs::write(path, contents).expect("write fixture");
    }

    #[test]
    fn test_is_eligible() {
        let scanner = SignatureScanner::new(vec![upload_rule()]);
        assert!(scanner.is_eligible(Path::new("plugin.php")));
        assert!(scanner.is_eligible(Path::new("assets/app.JS")));
        assert!(scanner.is_eligible(Path::new("views/form.twig")));
        assert!(!scanner.is_eligible(Path::new("logo.png")));
        assert!(!scanner.is_eligible(Path::new("README")));
    }

    #[test]
    fn test_custom_extensions() {
        let scanner = SignatureScanner::new(vec![upload_rule()]).with_extensions([".INC", "php"]);
        assert!(scanner.is_eligible(Path::new("lib.inc")));
        assert!(!scanner.is_eligible(Path::new("app.js")));
    }

    #[test]
    fn test_line_match_reports_line_and_rule() {
        let tmp = TempDir::new().expect("temp dir");
        write(
            tmp.path(),
            "inc/upload.php",
            b"<?php\n// handler\n$file = $_FILES['upload'];\n",
        );

        let outcome = SignatureScanner::new(vec![upload_rule()]).scan(tmp.path());
        assert_eq!(outcome.files_scanned, 1);
        assert_eq!(outcome.matches.len(), 1);
        let record = &outcome.matches[0];
        assert_eq!(record.relative_file_path, "inc/upload.php");
        assert_eq!(record.line_number, 3);
        assert_eq!(record.line_text, "$file = $_FILES['upload'];");
        assert_eq!(record.matched_rule, "upload");
    }

    #[test]
    fn test_each_rule_once_per_file() {
        let tmp = TempDir::new().expect("temp dir");
        write(
            tmp.path(),
            "a.php",
            b"wp_handle_upload($a);\r\neval($x);\r\nwp_handle_upload($b);\r\n",
        );
        let eval = ScanRule::new("eval", r"\beval\(").expect("eval rule");

        let outcome = SignatureScanner::new(vec![upload_rule(), eval]).scan(tmp.path());
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].matched_rule, "upload");
        assert_eq!(outcome.matches[0].line_number, 1);
        assert_eq!(outcome.matches[1].matched_rule, "eval");
        assert_eq!(outcome.matches[1].line_number, 2);
    }

    #[test]
    fn test_binary_fallback() {
        let tmp = TempDir::new().expect("temp dir");
        let mut data = vec![0xff, 0xfe, 0x00];
        data.extend_from_slice(b"media_handle_upload");
        write(tmp.path(), "packed.js", &data);

        let outcome = SignatureScanner::new(vec![upload_rule()]).scan(tmp.path());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].line_number, 0);
        assert_eq!(outcome.matches[0].line_text, BINARY_CONTENT_SENTINEL);
    }

    #[test]
    fn test_binary_file_reports_first_rule_only() {
        let tmp = TempDir::new().expect("temp dir");
        let mut data = vec![0xff, 0xfe, 0x00];
        data.extend_from_slice(b"wp_handle_upload eval(");
        write(tmp.path(), "packed.js", &data);
        let eval = ScanRule::new("eval", r"\beval\(").expect("eval rule");

        let outcome = SignatureScanner::new(vec![eval, upload_rule()]).scan(tmp.path());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].matched_rule, "eval");
        assert_eq!(outcome.matches[0].line_number, 0);
        assert_eq!(outcome.matches[0].line_text, BINARY_CONTENT_SENTINEL);
    }

    #[test]
    fn test_ineligible_files_ignored() {
        let tmp = TempDir::new().expect("temp dir");
        write(tmp.path(), "notes.txt", b"$_FILES everywhere");
        write(tmp.path(), "clean.php", b"<?php echo 'hi';");

        let scanner = SignatureScanner::new(vec![upload_rule()]);
        let outcome = scanner.scan(tmp.path());
        assert_eq!(outcome.files_scanned, 1);
        assert!(!outcome.has_matches());
        assert!(!scanner.has_any_match(tmp.path()));
    }

    #[test]
    fn test_has_any_match_agrees_with_scan() {
        let tmp = TempDir::new().expect("temp dir");
        write(tmp.path(), "a/one.php", b"<?php\n");
        write(tmp.path(), "b/two.html", b"<form enctype>\n$_FILES\n");

        let scanner = SignatureScanner::new(vec![upload_rule()]);
        assert!(scanner.has_any_match(tmp.path()));
        assert!(scanner.scan(tmp.path()).has_matches());
    }

    #[test]
    fn test_scan_is_deterministic() {
        let tmp = TempDir::new().expect("temp dir");
        for name in ["z.php", "a.php", "m/k.js"] {
            write(tmp.path(), name, b"wp_handle_upload()\n");
        }

        let scanner = SignatureScanner::new(vec![upload_rule()]);
        let first = scanner.scan(tmp.path());
        let second = scanner.scan(tmp.path());
        assert_eq!(first, second);
        let paths: Vec<_> = first
            .matches
            .iter()
            .map(|m| m.relative_file_path.as_str())
            .collect();
        assert_eq!(paths, vec!["a.php", "m/k.js", "z.php"]);
    }

    #[test]
    fn test_large_files_skipped() {
        let tmp = TempDir::new().expect("temp dir");
        write(tmp.path(), "big.php", b"$_FILES and a lot of padding");

        let outcome = SignatureScanner::new(vec![upload_rule()])
            .with_max_file_size(4)
            .scan(tmp.path());
        assert_eq!(outcome.files_scanned, 0);
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let outcome =
            SignatureScanner::new(vec![upload_rule()]).scan(Path::new("/nonexistent/bundle"));
        assert_eq!(outcome, ScanOutcome::default());
    }
}
