//! Byte-window scanner
//!
//! Slides a fixed-size window over a byte source with stride
//! `window_size - overlap` and reports every header match as a
//! [`Candidate`]. Each window only owns the matches that start inside its
//! stride, so overlapping windows never report the same header twice, and a
//! header straddling two windows is still seen whole by the first one as
//! long as `overlap >= pattern_length - 1`.

use crate::domain::entities::Candidate;
use crate::domain::repositories::{ByteSource, SourceError};
use crate::domain::services::SignatureRegistry;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Default window size (4 MiB)
pub const DEFAULT_WINDOW_SIZE: usize = 4 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("window size must be greater than zero")]
    ZeroWindow,

    #[error("overlap {overlap} must be smaller than the window size {window_size}")]
    OverlapTooLarge { overlap: usize, window_size: usize },
}

/// Checks that a window size and overlap leave a positive stride
pub fn check_geometry(window_size: usize, overlap: usize) -> Result<(), ScannerError> {
    if window_size == 0 {
        return Err(ScannerError::ZeroWindow);
    }
    if overlap >= window_size {
        return Err(ScannerError::OverlapTooLarge {
            overlap,
            window_size,
        });
    }
    Ok(())
}

/// A window that could not be read
///
/// Only the headers inside this window are lost; the stream continues with
/// the next window.
#[derive(Error, Debug)]
#[error("failed to read scan window at offset {offset}")]
pub struct WindowReadError {
    pub offset: u64,
    #[source]
    pub source: SourceError,
}

/// Scanner over one byte source
pub struct WindowScanner<'a> {
    registry: &'a SignatureRegistry,
    source: &'a dyn ByteSource,
    source_id: Arc<str>,
    window_size: usize,
    overlap: usize,
}

impl<'a> WindowScanner<'a> {
    /// Creates a scanner
    ///
    /// An overlap smaller than [`SignatureRegistry::min_overlap`] is accepted
    /// but headers crossing a window boundary may then be missed.
    pub fn new(
        registry: &'a SignatureRegistry,
        source: &'a dyn ByteSource,
        window_size: usize,
        overlap: usize,
    ) -> Result<Self, ScannerError> {
        check_geometry(window_size, overlap)?;
        if overlap < registry.min_overlap() {
            tracing::warn!(
                overlap,
                required = registry.min_overlap(),
                "overlap below longest header, boundary-spanning headers can be missed"
            );
        }

        Ok(Self {
            registry,
            source,
            source_id: Arc::from(source.id()),
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of two consecutive windows
    pub fn stride(&self) -> usize {
        self.window_size - self.overlap
    }

    /// Scans the whole source
    pub fn scan(&self) -> CandidateStream<'a> {
        self.scan_range(0..self.source.len())
    }

    /// Resumes scanning at `offset` without touching earlier bytes
    pub fn scan_from(&self, offset: u64) -> CandidateStream<'a> {
        self.scan_range(offset..self.source.len())
    }

    /// Scans headers that start inside `range`
    ///
    /// Windows may read past `range.end` to see headers that start inside
    /// the range but end after it, so adjacent ranges can be scanned
    /// independently and concatenated.
    pub fn scan_range(&self, range: Range<u64>) -> CandidateStream<'a> {
        let end = range.end.min(self.source.len());
        CandidateStream {
            registry: self.registry,
            source: self.source,
            source_id: Arc::clone(&self.source_id),
            window_size: self.window_size,
            stride: self.stride() as u64,
            position: range.start.min(end),
            end,
            pending: VecDeque::new(),
            buffer: Vec::new(),
            stop: None,
            interrupted: false,
        }
    }
}

/// Lazy sequence of candidates in ascending offset order
///
/// Windows are read on demand, so dropping the stream early stops all I/O.
pub struct CandidateStream<'a> {
    registry: &'a SignatureRegistry,
    source: &'a dyn ByteSource,
    source_id: Arc<str>,
    window_size: usize,
    stride: u64,
    position: u64,
    end: u64,
    pending: VecDeque<Candidate>,
    buffer: Vec<u8>,
    stop: Option<&'a (dyn Fn() -> bool + Sync)>,
    interrupted: bool,
}

impl<'a> CandidateStream<'a> {
    /// Polls `stop` before every window read and ends the stream once it
    /// returns `true`
    ///
    /// Candidates already found in earlier windows are still returned.
    pub fn interruptible(mut self, stop: &'a (dyn Fn() -> bool + Sync)) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Whether the stream ended because of the stop hook
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Whether every window of the range has been read and returned
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty() && self.position >= self.end
    }

    /// Offset of the next window to be read
    ///
    /// Candidates already buffered from earlier windows are still returned
    /// before any from this position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn scan_next_window(&mut self) -> Result<(), WindowReadError> {
        let window_start = self.position;
        let owned_end = window_start.saturating_add(self.stride).min(self.end);
        self.position = owned_end;

        let source_len = self.source.len();
        let window_len = (source_len - window_start).min(self.window_size as u64) as usize;

        self.buffer.resize(window_len, 0);
        self.source
            .read_exact_at(window_start, &mut self.buffer)
            .map_err(|source| WindowReadError {
                offset: window_start,
                source,
            })?;

        tracing::trace!(offset = window_start, len = window_len, "scan window");

        let owned = (owned_end - window_start) as usize;
        for hit in self.registry.find_headers(&self.buffer) {
            if hit.offset >= owned {
                break;
            }
            self.pending.push_back(Candidate::new(
                hit.file_type,
                window_start + hit.offset as u64,
                hit.match_len,
                Arc::clone(&self.source_id),
            ));
        }

        Ok(())
    }
}

impl Iterator for CandidateStream<'_> {
    type Item = Result<Candidate, WindowReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some(Ok(candidate));
            }
            if self.position >= self.end || self.interrupted {
                return None;
            }
            if self.stop.is_some_and(|stop| stop()) {
                tracing::debug!(offset = self.position, "scan interrupted");
                self.interrupted = true;
                return None;
            }
            if let Err(e) = self.scan_next_window() {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::FileType;
    use crate::infrastructure::source::MemorySource;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn with_magic_at(len: usize, offsets: &[usize]) -> MemorySource {
        let mut data = vec![0u8; len];
        for &offset in offsets {
            data[offset..offset + PNG_MAGIC.len()].copy_from_slice(&PNG_MAGIC);
        }
        MemorySource::new("mem", data)
    }

    fn offsets(stream: CandidateStream<'_>) -> Vec<u64> {
        stream.map(|c| c.unwrap().start_offset()).collect()
    }

    #[test]
    fn test_rejects_invalid_geometry() {
        let registry = SignatureRegistry::builtin();
        let source = with_magic_at(16, &[]);
        assert_eq!(
            WindowScanner::new(&registry, &source, 0, 0).err(),
            Some(ScannerError::ZeroWindow)
        );
        assert!(matches!(
            WindowScanner::new(&registry, &source, 64, 64),
            Err(ScannerError::OverlapTooLarge { .. })
        ));
    }

    #[test]
    fn test_no_duplicates_inside_overlap() {
        let registry = SignatureRegistry::builtin().filtered(&[FileType::Png]);
        // Offset 60 lies in the overlap of the first two windows
        let source = with_magic_at(256, &[60, 130]);
        let scanner = WindowScanner::new(&registry, &source, 80, 30).unwrap();

        assert_eq!(offsets(scanner.scan()), vec![60, 130]);
    }

    #[test]
    fn test_scan_from_skips_earlier_headers() {
        let registry = SignatureRegistry::builtin().filtered(&[FileType::Png]);
        let source = with_magic_at(256, &[10, 100, 200]);
        let scanner = WindowScanner::new(&registry, &source, 64, 7).unwrap();

        assert_eq!(offsets(scanner.scan_from(50)), vec![100, 200]);
        assert_eq!(offsets(scanner.scan_range(0..101)), vec![10, 100]);
    }

    #[test]
    fn test_stop_hook_ends_stream_between_windows() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let registry = SignatureRegistry::builtin().filtered(&[FileType::Png]);
        let source = with_magic_at(1024, &[0, 10, 512]);
        let scanner = WindowScanner::new(&registry, &source, 64, 7).unwrap();

        let stopped = AtomicBool::new(false);
        let stop = || stopped.load(Ordering::SeqCst);
        let mut stream = scanner.scan().interruptible(&stop);

        assert_eq!(stream.next().unwrap().unwrap().start_offset(), 0);
        stopped.store(true, Ordering::SeqCst);
        // Already buffered from the first window
        assert_eq!(stream.next().unwrap().unwrap().start_offset(), 10);
        assert!(stream.next().is_none());
        assert!(stream.was_interrupted());
        assert!(!stream.is_exhausted());
        assert_eq!(stream.position(), 57);
    }

    #[test]
    fn test_stream_is_lazy() {
        let registry = SignatureRegistry::builtin().filtered(&[FileType::Png]);
        let source = with_magic_at(1024, &[0, 512]);
        let scanner = WindowScanner::new(&registry, &source, 64, 7).unwrap();

        let mut stream = scanner.scan();
        assert_eq!(stream.next().unwrap().unwrap().start_offset(), 0);
        assert_eq!(stream.position(), 57);
    }
}
