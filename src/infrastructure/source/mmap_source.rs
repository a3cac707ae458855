//! Memory-mapped byte source
//!
//! Zero-copy access to image files; readers on different threads never
//! contend on a lock.

use super::open_error;
use crate::domain::repositories::{ByteSource, SourceError};
use memmap2::Mmap;
use std::fs::OpenOptions;
use std::path::Path;

pub struct MmapSource {
    mmap: Option<Mmap>,
    id: String,
}

impl MmapSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        // Mapping an empty file fails on some platforms
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            let mmap = unsafe { Mmap::map(&file) }
                .map_err(|e| SourceError::Other(format!("Failed to memory-map file: {}", e)))?;
            Some(mmap)
        };

        Ok(Self {
            mmap,
            id: path.display().to_string(),
        })
    }

    /// The whole mapped source
    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }
}

impl ByteSource for MmapSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let data = self.as_slice();
        if offset > data.len() as u64 {
            return Err(SourceError::InvalidOffset {
                offset,
                source_size: data.len() as u64,
            });
        }

        let start = offset as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_reads_match_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, memory-mapped world!").unwrap();
        file.flush().unwrap();

        let source = MmapSource::open(file.path()).unwrap();
        assert_eq!(source.read_vec(7, 6).unwrap(), b"memory");
        assert_eq!(source.read_vec(20, 100).unwrap(), b" world!");
    }

    #[test]
    fn test_mmap_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let source = MmapSource::open(file.path()).unwrap();
        assert!(source.is_empty());
    }
}
