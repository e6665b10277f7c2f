//! Named byte-pattern rules.

use once_cell::sync::Lazy;
use plugaudit_core::RuleConfig;
use regex::bytes::{Regex, RegexBuilder};
use thiserror::Error;

/// Upload handling entry points in WordPress plugin code.
static UPLOAD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(r"(wp_handle_upload|media_handle_upload|\$_FILES\b)")
        .expect("Upload regex is hardcoded and valid")
});

/// Errors raised while building rules.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The rule pattern is not a valid regex
    #[error("invalid pattern for rule '{name}': {source}")]
    InvalidPattern {
        /// Rule name
        name: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },
}

/// A named signature matched against raw file bytes.
///
/// Patterns are case-insensitive and `.` also matches newlines, so the same
/// rule works for per-line and whole-file matching.
#[derive(Debug, Clone)]
pub struct ScanRule {
    name: String,
    pattern: Regex,
}

impl ScanRule {
    /// Compile a rule from a regex pattern.
    ///
    /// # Errors
    /// Returns `SignatureError::InvalidPattern` if the pattern does not compile.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, SignatureError> {
        let name = name.into();
        let pattern = compile(pattern).map_err(|source| SignatureError::InvalidPattern {
            name: name.clone(),
            source,
        })?;
        Ok(Self { name, pattern })
    }

    /// Compile every configured rule, falling back to [`upload_rule`] when none are configured.
    ///
    /// # Errors
    /// Returns the first compilation failure.
    pub fn from_config(rules: &[RuleConfig]) -> Result<Vec<Self>, SignatureError> {
        if rules.is_empty() {
            return Ok(vec![upload_rule()]);
        }
        rules
            .iter()
            .map(|rule| Self::new(rule.name.clone(), &rule.pattern))
            .collect()
    }

    /// Rule name reported in match evidence.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the pattern occurs anywhere in `haystack`.
    #[must_use]
    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.pattern.is_match(haystack)
    }
}

/// The built-in `upload` rule.
#[must_use]
pub fn upload_rule() -> ScanRule {
    ScanRule {
        name: "upload".to_string(),
        pattern: UPLOAD_PATTERN.clone(),
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}
