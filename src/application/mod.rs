//! Application layer
//!
//! Scan configuration, the orchestrator use case and cancellation.

mod cancellation;
pub mod dto;
mod error;
mod scan_orchestrator;

pub use cancellation::CancellationToken;
pub use dto::{ConfigError, OverlapPolicy, ScanConfig};
pub use error::FatalScanError;
pub use scan_orchestrator::{ScanOrchestrator, ScanPhase, ScanProgress, run_scan};
