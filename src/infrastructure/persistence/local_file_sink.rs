//! Local filesystem sink
//!
//! Every artifact is written into a temporary file inside its destination
//! directory and renamed to its final name on commit, so an interrupted or
//! failed extraction never leaves a partial file behind. Re-running a scan
//! overwrites artifacts of the same name.

use crate::domain::entities::FileType;
use crate::domain::repositories::{ArtifactSink, ArtifactWriter, SinkError};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes artifacts below an output directory
pub struct LocalFileSink {
    root: PathBuf,
    organize_by_type: bool,
}

impl LocalFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            organize_by_type: false,
        }
    }

    /// Places each artifact in a subdirectory named after its extension
    pub fn organize_by_type(mut self, enabled: bool) -> Self {
        self.organize_by_type = enabled;
        self
    }

    fn directory_for(&self, file_type: FileType) -> PathBuf {
        if self.organize_by_type {
            self.root.join(file_type.extension())
        } else {
            self.root.clone()
        }
    }

    fn map_io(&self, e: io::Error) -> SinkError {
        if e.kind() == io::ErrorKind::PermissionDenied {
            SinkError::PermissionDenied(self.root.display().to_string())
        } else {
            SinkError::Io(e)
        }
    }
}

impl ArtifactSink for LocalFileSink {
    fn prepare(&self) -> Result<(), SinkError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(SinkError::NotADirectory(self.root.display().to_string()));
        }
        fs::create_dir_all(&self.root).map_err(|e| self.map_io(e))?;

        // Check that files can actually be created here
        NamedTempFile::new_in(&self.root).map_err(|e| self.map_io(e))?;
        Ok(())
    }

    fn create(&self, file_type: FileType, name: &str) -> Result<Box<dyn ArtifactWriter + '_>, SinkError> {
        let directory = self.directory_for(file_type);
        fs::create_dir_all(&directory).map_err(|e| self.map_io(e))?;

        let temp = NamedTempFile::new_in(&directory).map_err(|e| self.map_io(e))?;
        Ok(Box::new(LocalArtifactWriter {
            temp,
            target: directory.join(name),
        }))
    }

    fn open(&self, location: &Path) -> Result<Box<dyn Read + '_>, SinkError> {
        let file = File::open(location).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SinkError::NotFound(location.display().to_string()),
            _ => self.map_io(e),
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

struct LocalArtifactWriter {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for LocalArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl ArtifactWriter for LocalArtifactWriter {
    fn commit(self: Box<Self>) -> Result<PathBuf, SinkError> {
        let LocalArtifactWriter { mut temp, target } = *self;
        temp.flush()?;
        temp.persist(&target).map_err(|e| SinkError::Io(e.error))?;
        Ok(target)
    }
}
