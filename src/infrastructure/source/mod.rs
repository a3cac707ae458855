//! Byte source implementations
//!
//! Positioned file reads, memory-mapped files and in-memory buffers.

mod file_source;
mod memory_source;
mod mmap_source;

pub use file_source::FileSource;
pub use memory_source::MemorySource;
pub use mmap_source::MmapSource;

use crate::domain::repositories::SourceError;
use std::path::Path;

/// Maps an open error to the matching source error
pub(crate) fn open_error(path: &Path, e: std::io::Error) -> SourceError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            SourceError::PermissionDenied(format!("{} - try running with sudo", path.display()))
        }
        _ => SourceError::Io(e),
    }
}
