//! Scan-level errors

use crate::application::dto::ConfigError;
use crate::domain::repositories::{SinkError, SourceError};
use std::path::PathBuf;
use thiserror::Error;

/// Conditions that stop a scan before it starts
///
/// Everything that can go wrong with a single candidate is reported in the
/// scan report instead.
#[derive(Error, Debug)]
pub enum FatalScanError {
    #[error("Source {source_id} is unreadable")]
    SourceUnreadable {
        source_id: String,
        #[source]
        source: SourceError,
    },

    #[error("Output destination {} is unwritable", location.display())]
    OutputUnwritable {
        location: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}
