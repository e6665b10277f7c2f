//! Flat row projection of audit results.
//!
//! One row per match record, or a single summary row with empty evidence
//! columns when a result has no matches. The CSV backend persists exactly
//! these rows; the other backends produce them for export.

use crate::error::{Result, StoreError};
use plugaudit_core::{AuditResult, MatchRecord, Timestamp, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Bundle identifier
    pub identifier: String,
    /// Verdict display form (`Match`, `NoMatch`, `Error: ...`)
    pub verdict: String,
    /// RFC3339 timestamp
    pub timestamp: String,
    /// Files opened by the scanner
    pub files_scanned: u64,
    /// Number of match records for this identifier
    pub matches_count: u64,
    /// Relative path of the matching file
    pub file_path: Option<String>,
    /// Matching line (0 for binary content)
    pub line_number: Option<u64>,
    /// Matching line text
    pub line_text: Option<String>,
    /// Rule that matched
    pub matched_rule: Option<String>,
}

/// Flatten one result into rows.
#[must_use]
pub fn to_rows(result: &AuditResult) -> Vec<ExportRow> {
    let summary = ExportRow {
        identifier: result.identifier.clone(),
        verdict: result.verdict.to_string(),
        timestamp: result.timestamp.to_rfc3339(),
        files_scanned: result.files_scanned,
        matches_count: result.matches_count() as u64,
        file_path: None,
        line_number: None,
        line_text: None,
        matched_rule: None,
    };

    if result.evidence.is_empty() {
        return vec![summary];
    }

    result
        .evidence
        .iter()
        .map(|record| ExportRow {
            file_path: Some(record.relative_file_path.clone()),
            line_number: Some(record.line_number),
            line_text: Some(record.line_text.clone()),
            matched_rule: Some(record.matched_rule.clone()),
            ..summary.clone()
        })
        .collect()
}

/// Regroup rows into results, keeping first-seen identifier order.
///
/// When an identifier appears in several groups, the last group wins.
///
/// # Errors
/// Returns `StoreError::Decode` if a timestamp cannot be parsed.
pub fn from_rows(rows: impl IntoIterator<Item = ExportRow>) -> Result<Vec<AuditResult>> {
    let mut results: Vec<AuditResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let timestamp = Timestamp::from_rfc3339(&row.timestamp)
            .map_err(|e| StoreError::Decode(format!("row for '{}': {e}", row.identifier)))?;

        let result = match positions.get(&row.identifier).copied() {
            Some(index) if results[index].timestamp == timestamp => &mut results[index],
            Some(index) => {
                results[index] = empty_result(&row, timestamp);
                &mut results[index]
            }
            None => {
                positions.insert(row.identifier.clone(), results.len());
                results.push(empty_result(&row, timestamp));
                let last = results.len() - 1;
                &mut results[last]
            }
        };

        if let Some(file_path) = row.file_path {
            result.evidence.push(MatchRecord {
                relative_file_path: file_path,
                line_number: row.line_number.unwrap_or(0),
                line_text: row.line_text.unwrap_or_default(),
                matched_rule: row.matched_rule.unwrap_or_default(),
            });
        }
    }

    Ok(results)
}

fn empty_result(row: &ExportRow, timestamp: Timestamp) -> AuditResult {
    AuditResult {
        identifier: row.identifier.clone(),
        verdict: Verdict::parse(&row.verdict),
        timestamp,
        evidence: Vec::new(),
        files_scanned: row.files_scanned,
    }
}
