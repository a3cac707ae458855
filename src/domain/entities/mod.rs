//! Domain entities
//!
//! Core business objects of the carving domain: signatures, candidates,
//! recovered files and the scan report.

mod candidate;
mod file_signature;
mod recovered_file;
mod scan_report;

pub use candidate::Candidate;
pub use file_signature::{
    BytePattern, Endian, FieldWidth, FileCategory, FileType, LengthField, LengthMode,
    SignatureSpec, UnknownFileType,
};
pub use recovered_file::{artifact_name, Confidence, RecoveredFile};
pub use scan_report::{CandidateError, ReportSummary, ScanError, ScanMode, ScanReport, TypeTotals};
