//! In-memory sink

use crate::domain::entities::FileType;
use crate::domain::repositories::{ArtifactSink, ArtifactWriter, SinkError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Keeps committed artifacts in memory, keyed by location
///
/// Used for memory-only carving and for tests.
pub struct MemorySink {
    root: PathBuf,
    artifacts: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("memory"),
            artifacts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Contents of a committed artifact
    pub fn get(&self, location: &Path) -> Option<Vec<u8>> {
        self.artifacts.lock().get(location).cloned()
    }

    /// Locations of all committed artifacts, sorted
    pub fn locations(&self) -> Vec<PathBuf> {
        self.artifacts.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactSink for MemorySink {
    fn prepare(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn create(&self, _file_type: FileType, name: &str) -> Result<Box<dyn ArtifactWriter + '_>, SinkError> {
        Ok(Box::new(MemoryArtifactWriter {
            sink: self,
            location: self.root.join(name),
            buffer: Vec::new(),
        }))
    }

    fn open(&self, location: &Path) -> Result<Box<dyn Read + '_>, SinkError> {
        let data = self
            .get(location)
            .ok_or_else(|| SinkError::NotFound(location.display().to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

struct MemoryArtifactWriter<'a> {
    sink: &'a MemorySink,
    location: PathBuf,
    buffer: Vec<u8>,
}

impl Write for MemoryArtifactWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactWriter for MemoryArtifactWriter<'_> {
    fn commit(self: Box<Self>) -> Result<PathBuf, SinkError> {
        let MemoryArtifactWriter { sink, location, buffer } = *self;
        sink.artifacts.lock().insert(location.clone(), buffer);
        Ok(location)
    }
}
