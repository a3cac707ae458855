//! Signature-based file carving engine
//!
//! Recovers files from raw disk images, block devices and memory dumps by
//! locating known header signatures, resolving where each file ends and
//! extracting the byte ranges with a content hash.
//!
//! The crate is layered: [`domain`] holds entities, repository traits and
//! the carving services, [`application`] drives a scan, and
//! [`infrastructure`] provides concrete byte sources and artifact sinks.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use application::{CancellationToken, FatalScanError, ScanConfig, ScanOrchestrator, ScanProgress, run_scan};
pub use domain::entities::{Confidence, FileType, RecoveredFile, ScanMode, ScanReport};
