//! Signature registry service
//!
//! Immutable table of file signatures. Header lookup uses a single
//! Aho-Corasick automaton built over the literal anchor of every header
//! pattern, so a window is searched in O(n + m + z) regardless of how many
//! signatures are registered. Wildcard positions are verified after the
//! anchor hit.

use crate::domain::entities::{BytePattern, FileCategory, FileType, LengthField, LengthMode, SignatureSpec};
use aho_corasick::{AhoCorasick, MatchKind};
use serde::Serialize;
use std::collections::HashMap;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;

/// A header pattern that matched inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMatch {
    /// Offset of the first pattern byte, relative to the window
    pub offset: usize,
    pub file_type: FileType,
    pub match_len: usize,
}

/// One row of the "supported file types" listing
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub type_id: FileType,
    pub extension: &'static str,
    pub category: FileCategory,
    pub description: &'static str,
    pub headers: Vec<String>,
    pub footers: Vec<String>,
    pub length_mode: LengthMode,
    pub min_size: u64,
    pub max_size: u64,
}

#[derive(Debug, Clone, Copy)]
struct AnchorTarget {
    spec: usize,
    header: usize,
    anchor_offset: usize,
}

/// Registry of file signatures for header detection
///
/// Built once and never mutated; share it between scans and worker
/// threads by reference or `Arc`.
///
/// # Example
///
/// ```
/// use sigcarve::domain::services::SignatureRegistry;
/// use sigcarve::domain::entities::FileType;
///
/// let registry = SignatureRegistry::builtin();
/// let matches = registry.match_header(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
/// assert_eq!(matches, vec![(FileType::Jpeg, 4)]);
/// ```
#[derive(Debug)]
pub struct SignatureRegistry {
    specs: Vec<SignatureSpec>,
    by_type: HashMap<FileType, usize>,
    /// Aho-Corasick automaton over distinct anchors
    matcher: Option<AhoCorasick>,
    /// Maps automaton pattern index to every header sharing that anchor
    anchor_targets: Vec<Vec<AnchorTarget>>,
    max_header_len: usize,
    max_footer_len: usize,
}

impl SignatureRegistry {
    /// Builds a registry from signature specs, in the given order
    ///
    /// A type that appears more than once keeps its first spec.
    pub fn new(specs: Vec<SignatureSpec>) -> Self {
        let mut kept: Vec<SignatureSpec> = Vec::with_capacity(specs.len());
        let mut by_type = HashMap::new();

        for spec in specs {
            if by_type.contains_key(&spec.file_type()) {
                tracing::warn!(file_type = %spec.file_type(), "duplicate signature ignored");
                continue;
            }
            by_type.insert(spec.file_type(), kept.len());
            kept.push(spec);
        }

        let max_header_len = kept.iter().map(SignatureSpec::max_header_len).max().unwrap_or(0);
        let max_footer_len = kept.iter().map(SignatureSpec::max_footer_len).max().unwrap_or(0);

        let mut registry = Self {
            specs: kept,
            by_type,
            matcher: None,
            anchor_targets: Vec::new(),
            max_header_len,
            max_footer_len,
        };
        registry.build_matcher();
        registry
    }

    /// Creates the registry with every built-in signature
    pub fn builtin() -> Self {
        Self::new(builtin_signatures())
    }

    /// Returns a new registry restricted to `types`
    ///
    /// An empty slice keeps every type.
    pub fn filtered(&self, types: &[FileType]) -> Self {
        if types.is_empty() {
            return Self::new(self.specs.clone());
        }
        Self::new(
            self.specs
                .iter()
                .filter(|s| types.contains(&s.file_type()))
                .cloned()
                .collect(),
        )
    }

    fn build_matcher(&mut self) {
        let mut anchors: Vec<Vec<u8>> = Vec::new();
        let mut targets: Vec<Vec<AnchorTarget>> = Vec::new();
        let mut index: HashMap<Vec<u8>, usize> = HashMap::new();

        for (spec_idx, spec) in self.specs.iter().enumerate() {
            for (header_idx, pattern) in spec.headers().iter().enumerate() {
                let Some((anchor_offset, anchor)) = pattern.anchor() else {
                    tracing::warn!(
                        file_type = %spec.file_type(),
                        pattern = %pattern,
                        "header pattern has no literal bytes, skipped"
                    );
                    continue;
                };

                let target = AnchorTarget {
                    spec: spec_idx,
                    header: header_idx,
                    anchor_offset,
                };
                let slot = *index.entry(anchor.clone()).or_insert_with(|| {
                    anchors.push(anchor);
                    targets.push(Vec::new());
                    targets.len() - 1
                });
                targets[slot].push(target);
            }
        }

        self.matcher = if anchors.is_empty() {
            None
        } else {
            match AhoCorasick::builder()
                .match_kind(MatchKind::Standard)
                .build(&anchors)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build header automaton, using linear matching");
                    None
                }
            }
        };
        self.anchor_targets = targets;
    }

    /// Every signature, in registry order
    pub fn lookup_headers(&self) -> &[SignatureSpec] {
        &self.specs
    }

    /// Returns the signature for a file type
    pub fn get(&self, file_type: FileType) -> Option<&SignatureSpec> {
        self.by_type.get(&file_type).map(|&idx| &self.specs[idx])
    }

    pub fn contains(&self, file_type: FileType) -> bool {
        self.by_type.contains_key(&file_type)
    }

    pub fn types(&self) -> impl Iterator<Item = FileType> + '_ {
        self.specs.iter().map(SignatureSpec::file_type)
    }

    /// Longest header pattern across all signatures
    pub fn max_header_len(&self) -> usize {
        self.max_header_len
    }

    /// Longest footer pattern across all signatures
    pub fn max_footer_len(&self) -> usize {
        self.max_footer_len
    }

    /// Smallest window overlap that still catches boundary-spanning headers
    pub fn min_overlap(&self) -> usize {
        self.max_header_len.saturating_sub(1)
    }

    /// All types whose header matches at the very start of `window`
    ///
    /// Returns `(type, match_length)` pairs in registry order. Types sharing
    /// a prefix (ZIP and OOXML) are all reported; when several patterns of
    /// one type match, the longest wins.
    pub fn match_header(&self, window: &[u8]) -> Vec<(FileType, usize)> {
        self.specs
            .iter()
            .filter_map(|spec| {
                spec.headers()
                    .iter()
                    .filter(|p| p.anchor().is_some() && p.matches_prefix(window))
                    .map(BytePattern::len)
                    .max()
                    .map(|len| (spec.file_type(), len))
            })
            .collect()
    }

    /// Finds every header occurrence anywhere in `window`
    ///
    /// Results are sorted by offset, then by type. At most one match per
    /// `(offset, type)` is reported.
    pub fn find_headers(&self, window: &[u8]) -> Vec<HeaderMatch> {
        let Some(matcher) = &self.matcher else {
            return self.find_headers_linear(window);
        };

        let mut results = Vec::new();
        for hit in matcher.find_overlapping_iter(window) {
            for target in &self.anchor_targets[hit.pattern().as_usize()] {
                let Some(start) = hit.start().checked_sub(target.anchor_offset) else {
                    continue;
                };
                let spec = &self.specs[target.spec];
                let pattern = &spec.headers()[target.header];
                if pattern.matches_prefix(&window[start..]) {
                    results.push(HeaderMatch {
                        offset: start,
                        file_type: spec.file_type(),
                        match_len: pattern.len(),
                    });
                }
            }
        }

        normalize(results)
    }

    /// Fallback used when the automaton could not be built
    fn find_headers_linear(&self, window: &[u8]) -> Vec<HeaderMatch> {
        let mut results = Vec::new();
        for offset in 0..window.len() {
            for (file_type, match_len) in self.match_header(&window[offset..]) {
                results.push(HeaderMatch {
                    offset,
                    file_type,
                    match_len,
                });
            }
        }
        normalize(results)
    }

    /// Describes every registered type for the reporting layer
    pub fn capabilities(&self) -> Vec<Capability> {
        self.specs
            .iter()
            .map(|spec| {
                let file_type = spec.file_type();
                Capability {
                    type_id: file_type,
                    extension: file_type.extension(),
                    category: file_type.category(),
                    description: file_type.name(),
                    headers: spec.headers().iter().map(ToString::to_string).collect(),
                    footers: spec.footers().iter().map(hex::encode_upper).collect(),
                    length_mode: spec.length_mode(),
                    min_size: spec.min_size(),
                    max_size: spec.max_size(),
                }
            })
            .collect()
    }

    /// Returns the number of registered signatures
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(mut results: Vec<HeaderMatch>) -> Vec<HeaderMatch> {
    results.sort_unstable_by(|a, b| {
        (a.offset, a.file_type)
            .cmp(&(b.offset, b.file_type))
            .then(b.match_len.cmp(&a.match_len))
    });
    results.dedup_by(|next, kept| next.offset == kept.offset && next.file_type == kept.file_type);
    results
}

/// The built-in signature table
pub fn builtin_signatures() -> Vec<SignatureSpec> {
    use LengthMode::{FixedMax, FooterDelimited};

    let zip_footer = [0x50, 0x4B, 0x05, 0x06];
    // End of central directory: 4-byte magic followed by 18 fixed bytes
    let zip_trailer = 18;

    vec![
        SignatureSpec::new(FileType::Jpeg, FooterDelimited, 128, 50 * MB)
            .header(BytePattern::exact(&[0xFF, 0xD8, 0xFF, 0xE0]))
            .header(BytePattern::exact(&[0xFF, 0xD8, 0xFF, 0xE1]))
            .header(BytePattern::exact(&[0xFF, 0xD8, 0xFF, 0xDB]))
            .header(BytePattern::exact(&[0xFF, 0xD8, 0xFF, 0xEE]))
            .footer(&[0xFF, 0xD9]),
        // The short form still catches files whose line-ending check bytes are damaged
        SignatureSpec::new(FileType::Png, FooterDelimited, 67, 100 * MB)
            .header(BytePattern::exact(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]))
            .header(BytePattern::exact(&[0x89, 0x50, 0x4E, 0x47]))
            .footer(&[0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]),
        // GIF87a and GIF89a
        SignatureSpec::new(FileType::Gif, FooterDelimited, 35, 50 * MB)
            .header(BytePattern::exact(b"GIF89a").with_wildcards(4..5))
            .footer(&[0x00, 0x3B]),
        // "BM", file size, then two reserved words that are always zero
        SignatureSpec::new(
            FileType::Bmp,
            LengthMode::DeclaredInHeader(LengthField::u32_le(2, 0)),
            54,
            50 * MB,
        )
        .header(BytePattern::exact(&[0x42, 0x4D, 0, 0, 0, 0, 0, 0, 0, 0]).with_wildcards(2..6)),
        SignatureSpec::new(FileType::Tiff, FixedMax, 64, 20 * MB)
            .header(BytePattern::exact(&[0x49, 0x49, 0x2A, 0x00]))
            .header(BytePattern::exact(&[0x4D, 0x4D, 0x00, 0x2A])),
        SignatureSpec::new(
            FileType::WebP,
            LengthMode::DeclaredInHeader(LengthField::u32_le(4, 8)),
            30,
            50 * MB,
        )
        .header(BytePattern::exact(b"RIFF\0\0\0\0WEBP").with_wildcards(4..8)),
        SignatureSpec::new(FileType::Pdf, FooterDelimited, 64, 100 * MB)
            .header(BytePattern::exact(b"%PDF-"))
            .footer(b"%%EOF"),
        SignatureSpec::new(FileType::Ole, FixedMax, 512, 10 * MB).header(BytePattern::exact(&[
            0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1,
        ])),
        // Local file header whose first entry is the OOXML content-types part
        SignatureSpec::new(FileType::Ooxml, FooterDelimited, 100, 50 * MB)
            .header(
                BytePattern::exact(&[b"PK\x03\x04".as_slice(), [0u8; 26].as_slice(), b"[Content_Types].xml".as_slice()].concat())
                    .with_wildcards(4..30),
            )
            .footer(&zip_footer)
            .trailer(zip_trailer),
        SignatureSpec::new(FileType::Zip, FooterDelimited, 52, 50 * MB)
            .header(BytePattern::exact(&[0x50, 0x4B, 0x03, 0x04]))
            .footer(&zip_footer)
            .trailer(zip_trailer),
        SignatureSpec::new(FileType::Rar, FixedMax, 20, 10 * MB)
            .header(BytePattern::exact(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07])),
        SignatureSpec::new(FileType::SevenZip, FixedMax, 32, 10 * MB)
            .header(BytePattern::exact(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C])),
        // "ID3", major version, revision 0
        SignatureSpec::new(FileType::Mp3, FixedMax, 128, 10 * MB)
            .header(BytePattern::exact(&[0x49, 0x44, 0x33, 0x00, 0x00]).with_wildcards(3..4)),
        SignatureSpec::new(
            FileType::Wav,
            LengthMode::DeclaredInHeader(LengthField::u32_le(4, 8)),
            44,
            50 * MB,
        )
        .header(BytePattern::exact(b"RIFF\0\0\0\0WAVE").with_wildcards(4..8)),
        SignatureSpec::new(
            FileType::Avi,
            LengthMode::DeclaredInHeader(LengthField::u32_le(4, 8)),
            64,
            50 * MB,
        )
        .header(BytePattern::exact(b"RIFF\0\0\0\0AVI ").with_wildcards(4..8)),
        SignatureSpec::new(FileType::Mp4, FixedMax, 64, 50 * MB)
            .header(BytePattern::exact(b"\0\0\0\0ftyp").with_wildcards(0..4)),
        SignatureSpec::new(FileType::Matroska, FixedMax, 64, 50 * MB)
            .header(BytePattern::exact(&[0x1A, 0x45, 0xDF, 0xA3])),
        SignatureSpec::new(FileType::Elf, FixedMax, 52, 10 * MB)
            .header(BytePattern::exact(&[0x7F, 0x45, 0x4C, 0x46])),
        // "MZ" with the DOS stub values every linker emits
        SignatureSpec::new(FileType::Pe, FixedMax, 128, 10 * MB).header(BytePattern::exact(&[
            0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00,
        ])),
        // Magic followed by minor/major version
        SignatureSpec::new(FileType::JavaClass, FixedMax, 32, 10 * MB)
            .header(BytePattern::exact(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0]).with_wildcards(4..8)),
        SignatureSpec::new(FileType::Sqlite, FixedMax, 512, 50 * MB)
            .header(BytePattern::exact(b"SQLite format 3\0")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_type() {
        let registry = SignatureRegistry::builtin();
        assert_eq!(registry.len(), FileType::ALL.len());
        for file_type in FileType::ALL {
            assert!(registry.get(file_type).is_some(), "{file_type} missing");
        }
    }

    #[test]
    fn test_shared_prefix_reports_all_types() {
        let registry = SignatureRegistry::builtin();
        let mut header = b"PK\x03\x04".to_vec();
        header.extend_from_slice(&[0x14; 26]);
        header.extend_from_slice(b"[Content_Types].xml");

        let matches = registry.match_header(&header);
        assert_eq!(matches, vec![(FileType::Ooxml, 49), (FileType::Zip, 4)]);
    }

    #[test]
    fn test_find_headers_with_leading_wildcards() {
        let registry = SignatureRegistry::builtin();
        let mut window = vec![0x11u8; 32];
        window[10..18].copy_from_slice(b"\x00\x00\x00\x20ftyp");

        let hits = registry.find_headers(&window);
        assert_eq!(
            hits,
            vec![HeaderMatch {
                offset: 10,
                file_type: FileType::Mp4,
                match_len: 8,
            }]
        );
    }

    #[test]
    fn test_leading_wildcards_need_room_before_anchor() {
        let registry = SignatureRegistry::builtin();
        assert!(registry.find_headers(b"\x00\x00ftypisom").is_empty());
    }

    #[test]
    fn test_filtered_registry_is_independent() {
        let registry = SignatureRegistry::builtin();
        let png_only = registry.filtered(&[FileType::Png]);
        assert_eq!(png_only.len(), 1);
        assert!(png_only.find_headers(&[0xFF, 0xD8, 0xFF, 0xE0]).is_empty());
        assert_eq!(registry.len(), FileType::ALL.len());
    }

    #[test]
    fn test_png_short_magic_is_enough() {
        let registry = SignatureRegistry::builtin();
        let mut window = vec![0x11u8; 24];
        window[4..8].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47]);
        window[12..20].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);

        let hits: Vec<_> = registry
            .find_headers(&window)
            .into_iter()
            .map(|h| (h.offset, h.file_type, h.match_len))
            .collect();
        assert_eq!(hits, vec![(4, FileType::Png, 4), (12, FileType::Png, 8)]);
    }

    #[test]
    fn test_min_overlap_tracks_longest_header() {
        let registry = SignatureRegistry::builtin();
        assert_eq!(registry.max_header_len(), 49);
        assert_eq!(registry.min_overlap(), 48);
    }

    #[test]
    fn test_capabilities_render_wildcards() {
        let registry = SignatureRegistry::builtin();
        let gif = registry
            .capabilities()
            .into_iter()
            .find(|c| c.type_id == FileType::Gif)
            .unwrap();
        assert_eq!(gif.headers, vec!["47 49 46 38 ?? 61".to_string()]);
        assert_eq!(gif.footers, vec!["003B".to_string()]);
        assert_eq!(gif.category, FileCategory::Image);
    }
}
