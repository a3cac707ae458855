//! File signature entity
//!
//! Describes how a file type is recognised in raw bytes (header patterns,
//! optional footers) and how the end of a carved file is determined.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Types of files the carving engine knows how to recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    WebP,
    Pdf,
    Ole,
    Ooxml,
    Zip,
    Rar,
    SevenZip,
    Mp3,
    Wav,
    Avi,
    Mp4,
    Matroska,
    Elf,
    Pe,
    JavaClass,
    Sqlite,
}

impl FileType {
    /// Every known type, in registry order
    pub const ALL: [FileType; 21] = [
        FileType::Jpeg,
        FileType::Png,
        FileType::Gif,
        FileType::Bmp,
        FileType::Tiff,
        FileType::WebP,
        FileType::Pdf,
        FileType::Ole,
        FileType::Ooxml,
        FileType::Zip,
        FileType::Rar,
        FileType::SevenZip,
        FileType::Mp3,
        FileType::Wav,
        FileType::Avi,
        FileType::Mp4,
        FileType::Matroska,
        FileType::Elf,
        FileType::Pe,
        FileType::JavaClass,
        FileType::Sqlite,
    ];

    /// Stable identifier, identical to the serialized form
    pub fn id(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpeg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Bmp => "bmp",
            FileType::Tiff => "tiff",
            FileType::WebP => "webp",
            FileType::Pdf => "pdf",
            FileType::Ole => "ole",
            FileType::Ooxml => "ooxml",
            FileType::Zip => "zip",
            FileType::Rar => "rar",
            FileType::SevenZip => "sevenzip",
            FileType::Mp3 => "mp3",
            FileType::Wav => "wav",
            FileType::Avi => "avi",
            FileType::Mp4 => "mp4",
            FileType::Matroska => "matroska",
            FileType::Elf => "elf",
            FileType::Pe => "pe",
            FileType::JavaClass => "javaclass",
            FileType::Sqlite => "sqlite",
        }
    }

    /// Returns the typical file extension for this file type
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Bmp => "bmp",
            FileType::Tiff => "tif",
            FileType::WebP => "webp",
            FileType::Pdf => "pdf",
            FileType::Ole => "doc",
            FileType::Ooxml => "docx",
            FileType::Zip => "zip",
            FileType::Rar => "rar",
            FileType::SevenZip => "7z",
            FileType::Mp3 => "mp3",
            FileType::Wav => "wav",
            FileType::Avi => "avi",
            FileType::Mp4 => "mp4",
            FileType::Matroska => "mkv",
            FileType::Elf => "elf",
            FileType::Pe => "exe",
            FileType::JavaClass => "class",
            FileType::Sqlite => "sqlite",
        }
    }

    /// Returns a human-readable name for this file type
    pub fn name(&self) -> &'static str {
        match self {
            FileType::Jpeg => "JPEG Image",
            FileType::Png => "PNG Image",
            FileType::Gif => "GIF Image",
            FileType::Bmp => "BMP Image",
            FileType::Tiff => "TIFF Image",
            FileType::WebP => "WebP Image",
            FileType::Pdf => "PDF Document",
            FileType::Ole => "Microsoft Office (OLE2)",
            FileType::Ooxml => "Microsoft Office (OOXML)",
            FileType::Zip => "ZIP Archive",
            FileType::Rar => "RAR Archive",
            FileType::SevenZip => "7-Zip Archive",
            FileType::Mp3 => "MP3 Audio (ID3)",
            FileType::Wav => "WAV Audio",
            FileType::Avi => "AVI Video",
            FileType::Mp4 => "MP4 Video",
            FileType::Matroska => "Matroska Video",
            FileType::Elf => "ELF Executable",
            FileType::Pe => "Windows Executable",
            FileType::JavaClass => "Java Class",
            FileType::Sqlite => "SQLite Database",
        }
    }

    pub fn category(&self) -> FileCategory {
        match self {
            FileType::Jpeg
            | FileType::Png
            | FileType::Gif
            | FileType::Bmp
            | FileType::Tiff
            | FileType::WebP => FileCategory::Image,
            FileType::Pdf | FileType::Ole | FileType::Ooxml => FileCategory::Document,
            FileType::Zip | FileType::Rar | FileType::SevenZip => FileCategory::Archive,
            FileType::Mp3 | FileType::Wav => FileCategory::Audio,
            FileType::Avi | FileType::Mp4 | FileType::Matroska => FileCategory::Video,
            FileType::Elf | FileType::Pe | FileType::JavaClass => FileCategory::Executable,
            FileType::Sqlite => FileCategory::Database,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when a type identifier is not known
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file type id: {0}")]
pub struct UnknownFileType(pub String);

impl FromStr for FileType {
    type Err = UnknownFileType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        FileType::ALL
            .iter()
            .copied()
            .find(|t| t.id() == needle || t.extension() == needle)
            .ok_or_else(|| UnknownFileType(s.to_string()))
    }
}

/// Broad family a file type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
    Archive,
    Audio,
    Video,
    Executable,
    Database,
}

/// Header pattern with optional single-byte wildcards
///
/// `None` positions match any byte. A pattern is only usable for scanning
/// when it contains at least one literal byte (see [`BytePattern::anchor`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<Option<u8>>,
}

impl BytePattern {
    /// Creates a pattern that matches `bytes` exactly
    pub fn exact(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
        }
    }

    /// Turns every position in `range` into a wildcard
    pub fn with_wildcards(mut self, range: Range<usize>) -> Self {
        let end = range.end.min(self.bytes.len());
        for slot in &mut self.bytes[range.start.min(end)..end] {
            *slot = None;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_wildcards(&self) -> bool {
        self.bytes.iter().any(Option::is_none)
    }

    /// Checks whether `data` starts with this pattern
    pub fn matches_prefix(&self, data: &[u8]) -> bool {
        data.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(data)
                .all(|(expected, actual)| expected.is_none_or(|b| b == *actual))
    }

    /// Longest run of literal bytes, with its offset inside the pattern
    ///
    /// Runs made only of zero bytes are used as a last resort since zero
    /// fill is everywhere on raw media. Ties resolve to the earliest run.
    pub fn anchor(&self) -> Option<(usize, Vec<u8>)> {
        let mut best: Option<(usize, usize, bool)> = None;
        let mut run_start = None;

        for (idx, byte) in self.bytes.iter().chain(std::iter::once(&None)).enumerate() {
            match (byte, run_start) {
                (Some(_), None) => run_start = Some(idx),
                (None, Some(start)) => {
                    let len = idx - start;
                    let selective = self.bytes[start..idx].iter().any(|b| *b != Some(0));
                    let better = match best {
                        None => true,
                        Some((_, best_len, best_selective)) => {
                            (selective, len) > (best_selective, best_len)
                        }
                    };
                    if better {
                        best = Some((start, len, selective));
                    }
                    run_start = None;
                }
                _ => {}
            }
        }

        best.map(|(start, len, _)| {
            let literal = self.bytes[start..start + len]
                .iter()
                .map(|b| b.unwrap_or_default())
                .collect();
            (start, literal)
        })
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.bytes.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            match byte {
                Some(b) => write!(f, "{:02X}", b)?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

/// Width of a length field embedded in a header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldWidth {
    U16,
    U32,
    U64,
}

impl FieldWidth {
    pub fn bytes(&self) -> usize {
        match self {
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
            FieldWidth::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

/// A length value stored at a fixed position inside the header
///
/// The declared file length is `value + adjust` (RIFF stores the size of
/// everything after its first 8 bytes, so it uses `adjust = 8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthField {
    pub offset: usize,
    pub width: FieldWidth,
    pub endian: Endian,
    pub adjust: u64,
}

impl LengthField {
    pub const fn u32_le(offset: usize, adjust: u64) -> Self {
        Self {
            offset,
            width: FieldWidth::U32,
            endian: Endian::Little,
            adjust,
        }
    }

    /// Number of header bytes needed to read the field
    pub fn span(&self) -> usize {
        self.offset + self.width.bytes()
    }

    /// Reads the declared file length from the start of a file
    pub fn read(&self, header: &[u8]) -> Option<u64> {
        let raw = header.get(self.offset..self.span())?;
        let mut buf = [0u8; 8];
        let value = match self.endian {
            Endian::Little => {
                buf[..raw.len()].copy_from_slice(raw);
                u64::from_le_bytes(buf)
            }
            Endian::Big => {
                buf[8 - raw.len()..].copy_from_slice(raw);
                u64::from_be_bytes(buf)
            }
        };
        value.checked_add(self.adjust)
    }
}

/// How the end of a carved file is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LengthMode {
    /// Nearest footer pattern after the header, capped at `max_size`
    FooterDelimited,
    /// Always `max_size` bytes (or up to the end of the source)
    FixedMax,
    /// Length field parsed from the header
    DeclaredInHeader(LengthField),
}

/// Immutable description of one file type's signature
#[derive(Debug, Clone)]
pub struct SignatureSpec {
    file_type: FileType,
    headers: Vec<BytePattern>,
    footers: Vec<Vec<u8>>,
    footer_trailer: u64,
    min_size: u64,
    max_size: u64,
    length_mode: LengthMode,
}

impl SignatureSpec {
    /// Creates a signature without patterns; add them with [`header`](Self::header)
    /// and [`footer`](Self::footer)
    pub fn new(file_type: FileType, length_mode: LengthMode, min_size: u64, max_size: u64) -> Self {
        Self {
            file_type,
            headers: Vec::new(),
            footers: Vec::new(),
            footer_trailer: 0,
            min_size: min_size.max(1),
            max_size: max_size.max(min_size.max(1)),
            length_mode,
        }
    }

    pub fn header(mut self, pattern: BytePattern) -> Self {
        self.headers.push(pattern);
        self
    }

    pub fn footer(mut self, bytes: &[u8]) -> Self {
        if !bytes.is_empty() {
            self.footers.push(bytes.to_vec());
        }
        self
    }

    /// Bytes that still belong to the file after its footer
    pub fn trailer(mut self, bytes: u64) -> Self {
        self.footer_trailer = bytes;
        self
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn headers(&self) -> &[BytePattern] {
        &self.headers
    }

    pub fn footers(&self) -> &[Vec<u8>] {
        &self.footers
    }

    pub fn footer_trailer(&self) -> u64 {
        self.footer_trailer
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn length_mode(&self) -> LengthMode {
        self.length_mode
    }

    /// Longest header pattern of this signature
    pub fn max_header_len(&self) -> usize {
        self.headers.iter().map(BytePattern::len).max().unwrap_or(0)
    }

    /// Longest footer pattern of this signature
    pub fn max_footer_len(&self) -> usize {
        self.footers.iter().map(Vec::len).max().unwrap_or(0)
    }
}
