//! File-backed byte source
//!
//! Reads disk images and block devices through positioned reads on a single
//! file handle.

use super::open_error;
use crate::domain::repositories::{ByteSource, SourceError};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Byte source over a disk image or device
///
/// Opened read-only. Concurrent readers serialize on the file handle.
pub struct FileSource {
    file: Mutex<File>,
    id: String,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        // Block devices report a zero metadata length, seeking works for both
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            file: Mutex::new(file),
            id: path.display().to_string(),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        if offset > self.size {
            return Err(SourceError::InvalidOffset {
                offset,
                source_size: self.size,
            });
        }

        let to_read = (self.size - offset).min(buf.len() as u64) as usize;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < to_read {
            match file.read(&mut buf[filled..to_read]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SourceError::ReadError {
                        offset: offset + filled as u64,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(filled)
    }
}
