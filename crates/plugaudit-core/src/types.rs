//! Shared types used across the audit pipeline.
//!
//! This module defines the identifier newtype, verdicts, match evidence and
//! the per-identifier audit result that flows from the orchestrator into the
//! result stores.

use crate::error::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Callback receiving human-readable progress messages.
///
/// Used by the orchestrator and the discovery crawler. Implementations must
/// be cheap; they are invoked inline from the driving task.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Default progress sink: forwards messages to the `tracing` info level.
#[must_use]
pub fn log_progress() -> ProgressCallback {
    Arc::new(|message: &str| tracing::info!(target: "plugaudit::progress", "{message}"))
}

/// Newtype for bundle identifiers ("slugs").
///
/// Identifiers are opaque; the only constraint is that they are non-empty
/// after trimming surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Parse an identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns `AuditError::Validation` if the trimmed input is empty.
    pub fn parse(raw: &str) -> Result<Self, AuditError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuditError::Validation("empty identifier".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Terminal classification of one audit attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Verdict {
    /// At least one scan rule matched
    Match,
    /// The bundle was scanned and nothing matched
    NoMatch,
    /// The identifier already had a persisted result
    Skipped,
    /// Retrieval or scanning failed
    Error(String),
}

impl Verdict {
    /// Parse the display form produced by `Verdict`'s `Display` impl.
    ///
    /// Unknown values are treated as errors carrying the raw text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "Match" => Self::Match,
            "NoMatch" => Self::NoMatch,
            "Skipped" => Self::Skipped,
            other => match other.strip_prefix("Error: ") {
                Some(detail) => Self::Error(detail.to_string()),
                None => Self::Error(other.to_string()),
            },
        }
    }

    /// Short label without the error detail.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Match => "Match",
            Self::NoMatch => "NoMatch",
            Self::Skipped => "Skipped",
            Self::Error(_) => "Error",
        }
    }

    /// Error detail, if this is an error verdict.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Error(detail) => Some(detail),
            _ => None,
        }
    }

    /// Whether a result with this verdict is written to durable storage.
    ///
    /// Skipped results are reported but never persisted.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(detail) => write!(f, "Error: {detail}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// One signature hit inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Path of the file relative to the bundle root, `/`-separated
    pub relative_file_path: String,
    /// 1-based line number, or 0 when the content is not line-addressable
    pub line_number: u64,
    /// Matched line (trimmed), or a sentinel for binary content
    pub line_text: String,
    /// Name of the rule that matched
    pub matched_rule: String,
}

/// Outcome of auditing one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    /// Trimmed identifier text (empty only for the empty-identifier failure)
    pub identifier: String,
    /// Terminal verdict
    pub verdict: Verdict,
    /// When the result was produced
    pub timestamp: Timestamp,
    /// Ordered evidence supporting a `Match` verdict
    pub evidence: Vec<MatchRecord>,
    /// Number of files opened by the scanner
    pub files_scanned: u64,
}

impl AuditResult {
    /// Create a result stamped with the current time.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        verdict: Verdict,
        evidence: Vec<MatchRecord>,
        files_scanned: u64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            verdict,
            timestamp: Timestamp::now(),
            evidence,
            files_scanned,
        }
    }

    /// Build a `Match`/`NoMatch` result from scanner output.
    #[must_use]
    pub fn from_scan(
        identifier: impl Into<String>,
        evidence: Vec<MatchRecord>,
        files_scanned: u64,
    ) -> Self {
        let verdict = if evidence.is_empty() {
            Verdict::NoMatch
        } else {
            Verdict::Match
        };
        Self::new(identifier, verdict, evidence, files_scanned)
    }

    /// Build a `Skipped` result.
    #[must_use]
    pub fn skipped(identifier: impl Into<String>) -> Self {
        Self::new(identifier, Verdict::Skipped, Vec::new(), 0)
    }

    /// Build an `Error` result.
    #[must_use]
    pub fn failed(identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(identifier, Verdict::Error(detail.into()), Vec::new(), 0)
    }

    /// Number of evidence records.
    #[must_use]
    pub fn matches_count(&self) -> usize {
        self.evidence.len()
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, AuditError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| AuditError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
