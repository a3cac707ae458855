//! In-memory byte source

use crate::domain::repositories::{ByteSource, SourceError};

/// Byte source over an owned buffer (memory dumps, tests)
#[derive(Debug, Clone)]
pub struct MemorySource {
    id: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self { id: id.into(), data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        if offset > self.data.len() as u64 {
            return Err(SourceError::InvalidOffset {
                offset,
                source_size: self.data.len() as u64,
            });
        }

        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
