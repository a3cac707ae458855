//! Recovered file entity
//!
//! Represents a file that has been carved, written out and hashed.

use super::file_signature::FileType;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// How trustworthy the resolved end offset is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// End found through a footer or a consistent declared length
    High,
    /// End guessed from the maximum size or the quick-scan length
    Heuristic,
}

/// Record of one recovered file
///
/// Immutable once built. `start_offset < end_offset` always holds and
/// `byte_length == end_offset - start_offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredFile {
    type_id: FileType,
    start_offset: u64,
    end_offset: u64,
    byte_length: u64,
    content_hash: String,
    confidence: Confidence,
    extraction_path: PathBuf,
}

impl RecoveredFile {
    /// Creates a new record, or `None` if the range is empty or inverted
    pub fn new(
        type_id: FileType,
        start_offset: u64,
        end_offset: u64,
        content_hash: String,
        confidence: Confidence,
        extraction_path: PathBuf,
    ) -> Option<Self> {
        if start_offset >= end_offset {
            return None;
        }

        Some(Self {
            type_id,
            start_offset,
            end_offset,
            byte_length: end_offset - start_offset,
            content_hash,
            confidence,
            extraction_path,
        })
    }

    pub fn type_id(&self) -> FileType {
        self.type_id
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    /// Lowercase hex SHA-256 of the extracted bytes
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn extraction_path(&self) -> &Path {
        &self.extraction_path
    }

    /// Whether `other` lies entirely inside this file's byte range
    pub fn contains(&self, start: u64, end: u64) -> bool {
        self.start_offset <= start && end <= self.end_offset
    }

    /// Returns a human-readable size string
    pub fn size_human(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        let size = self.byte_length;
        if size >= GB {
            format!("{:.2} GB", size as f64 / GB as f64)
        } else if size >= MB {
            format!("{:.2} MB", size as f64 / MB as f64)
        } else if size >= KB {
            format!("{:.2} KB", size as f64 / KB as f64)
        } else {
            format!("{} bytes", size)
        }
    }
}

/// Deterministic artifact name for a file carved at `start_offset`
///
/// Re-running a scan with the same configuration produces the same names.
pub fn artifact_name(type_id: FileType, start_offset: u64) -> String {
    format!(
        "carved_{}_{:012x}.{}",
        type_id.id(),
        start_offset,
        type_id.extension()
    )
}
