//! Artifact sink trait
//!
//! Destination for carved files. One artifact is written per recovered file;
//! the engine never leaves a half-written artifact behind.

use crate::domain::entities::FileType;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when writing or reading back artifacts
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Output location is not a directory: {0}")]
    NotADirectory(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write error: {0}")]
    Other(String),
}

/// Handle to an artifact being written
///
/// Dropping the handle without calling [`commit`](ArtifactWriter::commit)
/// discards everything written so far.
pub trait ArtifactWriter: Write + Send {
    /// Makes the artifact visible under its final location and returns it
    fn commit(self: Box<Self>) -> Result<PathBuf, SinkError>;
}

/// Trait for storing carved artifacts
///
/// # Example
///
/// ```
/// use sigcarve::domain::entities::FileType;
/// use sigcarve::domain::repositories::ArtifactSink;
/// use sigcarve::infrastructure::persistence::MemorySink;
/// use std::io::{Read, Write};
///
/// let sink = MemorySink::new();
/// let mut writer = sink.create(FileType::Png, "a.png").unwrap();
/// writer.write_all(b"data").unwrap();
/// let location = writer.commit().unwrap();
///
/// let mut back = Vec::new();
/// sink.open(&location).unwrap().read_to_end(&mut back).unwrap();
/// assert_eq!(back, b"data");
/// ```
pub trait ArtifactSink: Send + Sync {
    /// Checks that the destination exists (creating it if needed) and is writable
    fn prepare(&self) -> Result<(), SinkError>;

    /// Starts a new artifact with a deterministic `name`
    fn create(&self, file_type: FileType, name: &str)
    -> Result<Box<dyn ArtifactWriter + '_>, SinkError>;

    /// Opens a committed artifact for reading
    fn open(&self, location: &Path) -> Result<Box<dyn Read + '_>, SinkError>;

    /// Root location of the sink, for reports and logs
    fn root(&self) -> &Path;
}
