//! Synthetic disk images for integration tests
//!
//! Payload bytes cycle through lowercase ASCII and filler is 0x11, so no
//! registered header or footer can appear by accident.

#![allow(dead_code)]

use sigcarve::domain::repositories::{ByteSource, SourceError};
use sigcarve::infrastructure::source::MemorySource;
use sigcarve::{CancellationToken, FileType};
use std::sync::atomic::{AtomicU64, Ordering};

pub const FILLER: u8 = 0x11;

pub const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const PNG_IEND: [u8; 8] = [0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82];
pub const JPEG_SOI: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

pub fn payload(len: usize) -> Vec<u8> {
    (b'a'..=b'z').cycle().take(len).collect()
}

pub fn jpeg(body: usize) -> Vec<u8> {
    [JPEG_SOI.as_slice(), payload(body).as_slice(), JPEG_EOI.as_slice()].concat()
}

/// JPEG header and data without an end marker
pub fn jpeg_without_footer(total: usize) -> Vec<u8> {
    [JPEG_SOI.as_slice(), payload(total - JPEG_SOI.len()).as_slice()].concat()
}

pub fn png(body: usize) -> Vec<u8> {
    [PNG_MAGIC.as_slice(), payload(body).as_slice(), PNG_IEND.as_slice()].concat()
}

pub fn gif(body: usize) -> Vec<u8> {
    [b"GIF89a".as_slice(), payload(body).as_slice(), [0x00u8, 0x3B].as_slice()].concat()
}

pub fn pdf(body: usize) -> Vec<u8> {
    [b"%PDF-1.4\n".as_slice(), payload(body).as_slice(), b"%%EOF".as_slice()].concat()
}

/// ZIP local header, data, then an end-of-central-directory record
pub fn zip(body: usize) -> Vec<u8> {
    [
        b"PK\x03\x04".as_slice(),
        payload(body).as_slice(),
        b"PK\x05\x06".as_slice(),
        [0u8; 18].as_slice(),
    ]
    .concat()
}

/// RIFF/WAVE whose header declares `declared_total` bytes
pub fn wav(actual_total: usize, declared_total: u32) -> Vec<u8> {
    [
        b"RIFF".as_slice(),
        (declared_total - 8).to_le_bytes().as_slice(),
        b"WAVE".as_slice(),
        payload(actual_total - 12).as_slice(),
    ]
    .concat()
}

/// A file placed inside a synthetic image
#[derive(Debug, Clone)]
pub struct Placed {
    pub file_type: FileType,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Builds an image of `gap`-separated files, ending with `gap` filler bytes
pub fn image(files: &[(FileType, Vec<u8>)], gap: usize) -> (Vec<u8>, Vec<Placed>) {
    let mut data = Vec::new();
    let mut placed = Vec::new();

    for (file_type, bytes) in files {
        data.extend(std::iter::repeat_n(FILLER, gap));
        placed.push(Placed {
            file_type: *file_type,
            offset: data.len() as u64,
            bytes: bytes.clone(),
        });
        data.extend_from_slice(bytes);
    }
    data.extend(std::iter::repeat_n(FILLER, gap));

    (data, placed)
}

pub fn mixed_files() -> Vec<(FileType, Vec<u8>)> {
    vec![
        (FileType::Jpeg, jpeg(700)),
        (FileType::Png, png(400)),
        (FileType::Gif, gif(120)),
        (FileType::Pdf, pdf(900)),
        (FileType::Zip, zip(300)),
        (FileType::Wav, wav(600, 600)),
    ]
}

/// Memory source that counts the bytes served
///
/// Optionally cancels a token once more than a given number of bytes
/// has been served.
pub struct CountingSource {
    inner: MemorySource,
    bytes_read: AtomicU64,
    cancel_after: Option<(u64, CancellationToken)>,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemorySource::new("counted", data),
            bytes_read: AtomicU64::new(0),
            cancel_after: None,
        }
    }

    pub fn cancel_after(mut self, bytes: u64, token: CancellationToken) -> Self {
        self.cancel_after = Some((bytes, token));
        self
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }
}

impl ByteSource for CountingSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, SourceError> {
        let n = self.inner.read_at(offset, buf)?;
        let total = self.bytes_read.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
        if let Some((threshold, token)) = &self.cancel_after {
            if total > *threshold {
                token.cancel();
            }
        }
        Ok(n)
    }
}

/// Footer-less JPEG headers every `spacing` bytes
pub fn dense_jpeg_headers(len: usize, count: usize, spacing: usize) -> Vec<u8> {
    let mut data = vec![FILLER; len];
    for i in 0..count {
        let at = i * spacing;
        data[at..at + JPEG_SOI.len()].copy_from_slice(&JPEG_SOI);
    }
    data
}
