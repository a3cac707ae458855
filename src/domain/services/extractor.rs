//! Extractor service
//!
//! Copies a resolved byte range verbatim from the source into a new
//! artifact. Failures are local to the one artifact being written.

use crate::domain::entities::{FileType, artifact_name};
use crate::domain::repositories::{ArtifactSink, ByteSource, SinkError, SourceError};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Buffer size for streaming extraction (64KB)
pub const EXTRACTION_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("source read failed at offset {offset}")]
    ReadFailure {
        offset: u64,
        #[source]
        source: SourceError,
    },

    #[error("could not write artifact {artifact}")]
    WriteFailure {
        artifact: String,
        #[source]
        source: SinkError,
    },
}

/// A committed artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    pub location: PathBuf,
    pub bytes_written: u64,
}

/// Streams source ranges into an artifact sink
pub struct Extractor {
    buffer_size: usize,
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            buffer_size: EXTRACTION_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Copies `[start, end)` of `source` into an artifact named after
    /// `(file_type, start)`
    ///
    /// The artifact only becomes visible once every byte was written; on
    /// error nothing is left in the sink.
    pub fn extract(
        &self,
        source: &dyn ByteSource,
        sink: &dyn ArtifactSink,
        file_type: FileType,
        start: u64,
        end: u64,
    ) -> Result<ExtractedArtifact, ExtractError> {
        let name = artifact_name(file_type, start);
        let write_failure = |source: SinkError| ExtractError::WriteFailure {
            artifact: name.clone(),
            source,
        };

        let writer = sink.create(file_type, &name).map_err(write_failure)?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, writer);

        let mut buffer = vec![0u8; self.buffer_size.min(end.saturating_sub(start) as usize)];
        let mut offset = start;
        let mut total_written: u64 = 0;

        while offset < end {
            let to_read = (end - offset).min(buffer.len() as u64) as usize;
            source
                .read_exact_at(offset, &mut buffer[..to_read])
                .map_err(|source| ExtractError::ReadFailure { offset, source })?;
            writer
                .write_all(&buffer[..to_read])
                .map_err(|e| write_failure(SinkError::Io(e)))?;

            offset += to_read as u64;
            total_written += to_read as u64;
        }

        let writer = writer
            .into_inner()
            .map_err(|e| write_failure(SinkError::Io(e.into_error())))?;
        let location = writer.commit().map_err(write_failure)?;

        tracing::debug!(
            file_type = %file_type,
            offset = start,
            bytes = total_written,
            artifact = %location.display(),
            "artifact written"
        );

        Ok(ExtractedArtifact {
            location,
            bytes_written: total_written,
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemorySink;
    use crate::infrastructure::source::MemorySource;
    use std::io::Read;

    #[test]
    fn test_extract_copies_range_verbatim() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let source = MemorySource::new("mem", data.clone());
        let sink = MemorySink::new();

        let artifact = Extractor::with_buffer_size(7)
            .extract(&source, &sink, FileType::Png, 100, 350)
            .unwrap();
        assert_eq!(artifact.bytes_written, 250);

        let mut back = Vec::new();
        sink.open(&artifact.location).unwrap().read_to_end(&mut back).unwrap();
        assert_eq!(back, &data[100..350]);
    }

    #[test]
    fn test_read_failure_leaves_nothing() {
        let source = MemorySource::new("mem", vec![0u8; 100]);
        let sink = MemorySink::new();

        let err = Extractor::new()
            .extract(&source, &sink, FileType::Jpeg, 50, 200)
            .unwrap_err();
        assert!(matches!(err, ExtractError::ReadFailure { .. }));
        assert!(sink.is_empty());
    }
}
