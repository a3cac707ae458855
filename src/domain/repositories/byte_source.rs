//! Byte source trait
//!
//! Read-only, random-access view over the data being carved: a disk image,
//! a block device or an in-memory buffer. The engine never writes to it.

use std::io;
use thiserror::Error;

/// Errors that can occur when reading from a byte source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid offset: {offset} exceeds source size {source_size}")]
    InvalidOffset { offset: u64, source_size: u64 },

    #[error("Read error at offset {offset}: {message}")]
    ReadError { offset: u64, message: String },

    #[error("Source error: {0}")]
    Other(String),
}

/// Trait for reading raw bytes from a finite, seekable source
///
/// Implementations must be shareable across worker threads; reads take
/// `&self` and carry their own offset.
///
/// # Example
///
/// ```
/// use sigcarve::domain::repositories::ByteSource;
/// use sigcarve::infrastructure::source::MemorySource;
///
/// let source = MemorySource::new("buffer", b"hello world".to_vec());
/// let mut buf = [0u8; 5];
/// source.read_exact_at(6, &mut buf).unwrap();
/// assert_eq!(&buf, b"world");
/// ```
pub trait ByteSource: Send + Sync {
    /// Identifier used in reports (usually the path)
    fn id(&self) -> &str;

    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `buf.len()` bytes at `offset`
    ///
    /// Returns fewer bytes only when the end of the source is reached.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Fills `buf` completely or fails
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(SourceError::ReadError {
                    offset: offset + filled as u64,
                    message: "Unexpected end of source".to_string(),
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads `length` bytes at `offset`, clamped to the end of the source
    fn read_vec(&self, offset: u64, length: usize) -> Result<Vec<u8>, SourceError> {
        let size = self.len();
        if offset > size {
            return Err(SourceError::InvalidOffset {
                offset,
                source_size: size,
            });
        }

        let available = (size - offset).min(length as u64) as usize;
        let mut buffer = vec![0u8; available];
        self.read_exact_at(offset, &mut buffer)?;
        Ok(buffer)
    }
}
