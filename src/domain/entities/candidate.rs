//! Candidate entity
//!
//! A header pattern that matched at some offset of a source. Candidates are
//! transient: the boundary resolver turns them into byte ranges.

use super::file_signature::FileType;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    file_type: FileType,
    start_offset: u64,
    header_len: usize,
    source_id: Arc<str>,
}

impl Candidate {
    pub fn new(file_type: FileType, start_offset: u64, header_len: usize, source_id: Arc<str>) -> Self {
        Self {
            file_type,
            start_offset,
            header_len,
            source_id,
        }
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Length of the header pattern that produced this candidate
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Deterministic report ordering: offset first, then type
    pub fn sort_key(&self) -> (u64, FileType) {
        (self.start_offset, self.file_type)
    }
}
