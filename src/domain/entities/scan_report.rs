//! Scan report entity
//!
//! The structured result of one scan. This is the only thing handed to the
//! reporting layer; it serializes to JSON for rendering and diffing.

use super::file_signature::FileType;
use super::recovered_file::{Confidence, RecoveredFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Scan strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Header-only detection, capped candidate count and extraction length
    Quick,
    /// Full boundary resolution over the whole source
    #[default]
    Deep,
}

/// Problem local to a single candidate
///
/// These never abort a scan; they are accumulated in [`ScanReport::errors`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateError {
    #[error("source ends after {available} bytes, below the minimum of {min_size}")]
    Truncated { available: u64, min_size: u64 },

    #[error("read failure at offset {offset}: {reason}")]
    ReadFailure { offset: u64, reason: String },

    #[error("write failure for {artifact}: {reason}")]
    WriteFailure { artifact: String, reason: String },

    #[error("declared length {declared} is inconsistent; fell back to maximum size")]
    InconsistentDeclaredLength { declared: u64 },

    #[error("contained in {by} record at offset {by_offset}")]
    SupersededByOverlap { by: FileType, by_offset: u64 },
}

/// A candidate error with enough context for later manual inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub offset: u64,
    /// `None` for errors not tied to a header match (unreadable scan window)
    pub type_id: Option<FileType>,
    pub error: CandidateError,
}

impl ScanError {
    pub fn new(offset: u64, type_id: Option<FileType>, error: CandidateError) -> Self {
        Self {
            offset,
            type_id,
            error,
        }
    }
}

/// Result of a complete scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    source_id: String,
    mode: ScanMode,
    bytes_scanned: u64,
    candidates_found: usize,
    files_recovered: Vec<RecoveredFile>,
    errors: Vec<ScanError>,
    /// Quick mode stopped early because the candidate cap was reached
    capped: bool,
    /// The scan was cancelled; finalized records are still valid
    partial: bool,
}

impl ScanReport {
    pub fn new(source_id: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            source_id: source_id.into(),
            mode,
            bytes_scanned: 0,
            candidates_found: 0,
            files_recovered: Vec::new(),
            errors: Vec::new(),
            capped: false,
            partial: false,
        }
    }

    pub fn add_recovered(&mut self, file: RecoveredFile) {
        self.files_recovered.push(file);
    }

    pub fn add_error(&mut self, error: ScanError) {
        self.errors.push(error);
    }

    pub fn set_bytes_scanned(&mut self, bytes: u64) {
        self.bytes_scanned = bytes;
    }

    pub fn set_candidates_found(&mut self, count: usize) {
        self.candidates_found = count;
    }

    pub fn mark_capped(&mut self) {
        self.capped = true;
    }

    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn bytes_scanned(&self) -> u64 {
        self.bytes_scanned
    }

    pub fn candidates_found(&self) -> usize {
        self.candidates_found
    }

    pub fn files_recovered(&self) -> &[RecoveredFile] {
        &self.files_recovered
    }

    /// Consumes self and returns the recovered records
    pub fn into_files(self) -> Vec<RecoveredFile> {
        self.files_recovered
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Aggregated counts for the reporting layer
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();

        for file in &self.files_recovered {
            let entry = summary.by_type.entry(file.type_id()).or_default();
            entry.files += 1;
            entry.bytes += file.byte_length();
            *summary.by_confidence.entry(file.confidence()).or_default() += 1;
            summary.bytes_recovered += file.byte_length();
        }
        summary.files_recovered = self.files_recovered.len();
        summary.error_count = self.errors.len();

        summary
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Per-type totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub files_recovered: usize,
    pub bytes_recovered: u64,
    pub error_count: usize,
    pub by_type: BTreeMap<FileType, TypeTotals>,
    pub by_confidence: BTreeMap<Confidence, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(file_type: FileType, start: u64, end: u64, confidence: Confidence) -> RecoveredFile {
        RecoveredFile::new(
            file_type,
            start,
            end,
            "00".into(),
            confidence,
            PathBuf::from("out"),
        )
        .unwrap()
    }

    #[test]
    fn test_summary_groups_by_type_and_confidence() {
        let mut report = ScanReport::new("disk.img", ScanMode::Deep);
        report.add_recovered(record(FileType::Jpeg, 0, 500, Confidence::Heuristic));
        report.add_recovered(record(FileType::Png, 500, 800, Confidence::High));
        report.add_recovered(record(FileType::Png, 900, 1000, Confidence::High));
        report.add_error(ScanError::new(
            1200,
            Some(FileType::Gif),
            CandidateError::Truncated {
                available: 10,
                min_size: 35,
            },
        ));

        let summary = report.summary();
        assert_eq!(summary.files_recovered, 3);
        assert_eq!(summary.bytes_recovered, 900);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.by_type[&FileType::Png].files, 2);
        assert_eq!(summary.by_type[&FileType::Png].bytes, 400);
        assert_eq!(summary.by_confidence[&Confidence::High], 2);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut report = ScanReport::new("mem", ScanMode::Quick);
        report.mark_capped();
        report.add_error(ScanError::new(
            7,
            None,
            CandidateError::ReadFailure {
                offset: 7,
                reason: "bad sector".into(),
            },
        ));

        let value: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["mode"], "quick");
        assert_eq!(value["capped"], true);
        assert_eq!(value["errors"][0]["error"]["kind"], "read_failure");
        assert_eq!(value["errors"][0]["type_id"], serde_json::Value::Null);
    }
}
