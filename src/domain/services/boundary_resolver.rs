//! Boundary resolver
//!
//! Decides where a candidate file ends, using the length strategy of its
//! signature.

use crate::domain::entities::{Candidate, Confidence, FileType, LengthField, LengthMode, SignatureSpec};
use crate::domain::repositories::{ByteSource, SourceError};
use crate::domain::services::{FooterIndex, FooterLookup, SignatureRegistry};
use memchr::memmem::Finder;
use thiserror::Error;

/// Bytes read per step while searching for a footer
const FOOTER_SEARCH_CHUNK: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum BoundaryError {
    /// The source ends before the smallest plausible file would
    #[error("source ends after {available} bytes, below the minimum of {min_size}")]
    Truncated { available: u64, min_size: u64 },

    #[error("no signature registered for {0}")]
    UnknownType(FileType),

    #[error("read failed at offset {offset}")]
    Read {
        offset: u64,
        #[source]
        source: SourceError,
    },
}

/// Resolved end of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Exclusive end offset in the source
    pub end_offset: u64,
    pub confidence: Confidence,
    /// Declared length that was found in the header but rejected
    pub rejected_declared_length: Option<u64>,
}

impl Resolution {
    fn heuristic(end_offset: u64) -> Self {
        Self {
            end_offset,
            confidence: Confidence::Heuristic,
            rejected_declared_length: None,
        }
    }

    fn high(end_offset: u64) -> Self {
        Self {
            end_offset,
            confidence: Confidence::High,
            rejected_declared_length: None,
        }
    }
}

/// Resolves candidate boundaries against a registry
pub struct BoundaryResolver<'a> {
    registry: &'a SignatureRegistry,
    footer_index: Option<&'a FooterIndex>,
}

impl<'a> BoundaryResolver<'a> {
    pub fn new(registry: &'a SignatureRegistry) -> Self {
        Self {
            registry,
            footer_index: None,
        }
    }

    /// Answers footer searches from `index` where it covers the range
    ///
    /// Ranges the index could not read are still searched on the source, so
    /// results and read errors match an unindexed resolver.
    pub fn with_footer_index(mut self, index: &'a FooterIndex) -> Self {
        self.footer_index = Some(index);
        self
    }

    /// Determines the end offset of `candidate`
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Truncated`] when fewer than `min_size` bytes remain
    /// after the start offset.
    pub fn resolve(&self, candidate: &Candidate, source: &dyn ByteSource) -> Result<Resolution, BoundaryError> {
        let spec = self.spec_for(candidate)?;
        let start = candidate.start_offset();
        let cap = check_available(spec, start, source.len())?;

        match spec.length_mode() {
            LengthMode::FixedMax => Ok(Resolution::heuristic(cap)),
            LengthMode::FooterDelimited => self.resolve_footer(spec, candidate, cap, source),
            LengthMode::DeclaredInHeader(field) => self.resolve_declared(spec, field, start, cap, source),
        }
    }

    /// Quick-mode resolution: a fixed length with no footer search
    pub fn quick_resolution(
        &self,
        candidate: &Candidate,
        source_len: u64,
        extract_len: u64,
    ) -> Result<Resolution, BoundaryError> {
        let spec = self.spec_for(candidate)?;
        let start = candidate.start_offset();
        let cap = check_available(spec, start, source_len)?;

        let end = start.saturating_add(extract_len.max(1)).min(cap);
        Ok(Resolution::heuristic(end))
    }

    fn spec_for(&self, candidate: &Candidate) -> Result<&'a SignatureSpec, BoundaryError> {
        self.registry
            .get(candidate.file_type())
            .ok_or(BoundaryError::UnknownType(candidate.file_type()))
    }

    fn resolve_footer(
        &self,
        spec: &SignatureSpec,
        candidate: &Candidate,
        cap: u64,
        source: &dyn ByteSource,
    ) -> Result<Resolution, BoundaryError> {
        let start = candidate.start_offset();
        let search_start = start + candidate.header_len() as u64;
        let min_end = start + spec.min_size();
        let trailer = spec.footer_trailer();

        if let Some(index) = self.footer_index {
            match index.lookup(spec.footers(), trailer, search_start..cap, min_end) {
                FooterLookup::Found(end) => return Ok(Resolution::high(end)),
                FooterLookup::Absent => {
                    tracing::debug!(
                        file_type = %candidate.file_type(),
                        offset = start,
                        "no footer before size cap"
                    );
                    return Ok(Resolution::heuristic(cap));
                }
                FooterLookup::Unknown => {}
            }
        }

        let finders: Vec<Finder<'_>> = spec.footers().iter().map(|f| Finder::new(f)).collect();
        let footer_pad = spec.max_footer_len().saturating_sub(1) as u64;

        let mut chunk_start = search_start;
        let mut buffer = Vec::new();

        while chunk_start < cap {
            let chunk_len = (cap - chunk_start).min(FOOTER_SEARCH_CHUNK as u64 + footer_pad) as usize;
            buffer.resize(chunk_len, 0);
            source
                .read_exact_at(chunk_start, &mut buffer)
                .map_err(|source| BoundaryError::Read {
                    offset: chunk_start,
                    source,
                })?;

            // (footer offset, end offset); the earliest footer wins across patterns
            let mut best: Option<(u64, u64)> = None;
            for finder in &finders {
                let footer_len = finder.needle().len() as u64;
                let found = finder
                    .find_iter(&buffer)
                    .map(|pos| {
                        let offset = chunk_start + pos as u64;
                        (offset, offset + footer_len + trailer)
                    })
                    .find(|&(_, end)| end >= min_end && end <= cap);

                if let Some(hit) = found {
                    if best.is_none_or(|(offset, _)| hit.0 < offset) {
                        best = Some(hit);
                    }
                }
            }

            if let Some((_, end)) = best {
                return Ok(Resolution::high(end));
            }

            chunk_start += FOOTER_SEARCH_CHUNK as u64;
        }

        tracing::debug!(
            file_type = %candidate.file_type(),
            offset = start,
            "no footer before size cap"
        );
        Ok(Resolution::heuristic(cap))
    }

    fn resolve_declared(
        &self,
        spec: &SignatureSpec,
        field: LengthField,
        start: u64,
        cap: u64,
        source: &dyn ByteSource,
    ) -> Result<Resolution, BoundaryError> {
        let remaining = source.len() - start;
        if (field.span() as u64) > remaining {
            return Ok(Resolution::heuristic(cap));
        }

        let mut header = vec![0u8; field.span()];
        source
            .read_exact_at(start, &mut header)
            .map_err(|source| BoundaryError::Read { offset: start, source })?;

        match field.read(&header) {
            Some(declared)
                if declared >= spec.min_size() && declared <= remaining && declared <= spec.max_size() =>
            {
                Ok(Resolution::high(start + declared))
            }
            declared => {
                tracing::debug!(
                    file_type = %spec.file_type(),
                    offset = start,
                    declared = ?declared,
                    "declared length rejected"
                );
                Ok(Resolution {
                    rejected_declared_length: declared,
                    ..Resolution::heuristic(cap)
                })
            }
        }
    }
}

/// Returns the size cap `min(start + max_size, source_len)` or `Truncated`
fn check_available(spec: &SignatureSpec, start: u64, source_len: u64) -> Result<u64, BoundaryError> {
    let available = source_len.saturating_sub(start);
    if available < spec.min_size() {
        return Err(BoundaryError::Truncated {
            available,
            min_size: spec.min_size(),
        });
    }
    Ok(start.saturating_add(spec.max_size()).min(source_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::FileType;
    use crate::infrastructure::source::MemorySource;
    use std::sync::Arc;

    fn candidate(file_type: FileType, offset: u64, header_len: usize) -> Candidate {
        Candidate::new(file_type, offset, header_len, Arc::from("mem"))
    }

    fn riff_wave(declared_body: u32, total: usize) -> Vec<u8> {
        let mut data = vec![0x11u8; total];
        data[0..4].copy_from_slice(b"RIFF");
        data[4..8].copy_from_slice(&declared_body.to_le_bytes());
        data[8..12].copy_from_slice(b"WAVE");
        data
    }

    #[test]
    fn test_fixed_max_clamps_to_source_end() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);
        let source = MemorySource::new("mem", vec![0u8; 4096]);

        let resolution = resolver.resolve(&candidate(FileType::Elf, 1000, 4), &source).unwrap();
        assert_eq!(resolution.end_offset, 4096);
        assert_eq!(resolution.confidence, Confidence::Heuristic);
    }

    #[test]
    fn test_declared_length_consistent() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);
        let source = MemorySource::new("mem", riff_wave(92, 400));

        let resolution = resolver.resolve(&candidate(FileType::Wav, 0, 12), &source).unwrap();
        assert_eq!(resolution.end_offset, 100);
        assert_eq!(resolution.confidence, Confidence::High);
        assert_eq!(resolution.rejected_declared_length, None);
    }

    #[test]
    fn test_declared_length_past_source_end_falls_back() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);
        let source = MemorySource::new("mem", riff_wave(10_000, 400));

        let resolution = resolver.resolve(&candidate(FileType::Wav, 0, 12), &source).unwrap();
        assert_eq!(resolution.end_offset, 400);
        assert_eq!(resolution.confidence, Confidence::Heuristic);
        assert_eq!(resolution.rejected_declared_length, Some(10_008));
    }

    #[test]
    fn test_truncated_candidate() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);
        let source = MemorySource::new("mem", vec![0u8; 100]);

        let err = resolver.resolve(&candidate(FileType::Jpeg, 50, 4), &source).unwrap_err();
        assert!(matches!(
            err,
            BoundaryError::Truncated {
                available: 50,
                min_size: 128
            }
        ));
    }

    #[test]
    fn test_quick_resolution_uses_extract_len() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);

        let resolution = resolver
            .quick_resolution(&candidate(FileType::Png, 100, 8), 10_000, 256)
            .unwrap();
        assert_eq!(resolution.end_offset, 356);
        assert_eq!(resolution.confidence, Confidence::Heuristic);
    }

    #[test]
    fn test_indexed_resolution_matches_direct_search() {
        let registry = SignatureRegistry::builtin();
        let mut data = vec![0x11u8; 8192];
        for at in [0, 1000, 3000] {
            data[at..at + 4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        }
        data[2000..2002].copy_from_slice(&[0xFF, 0xD9]);
        let source = MemorySource::new("mem", data);

        let candidates: Vec<_> = [0, 1000, 3000]
            .into_iter()
            .map(|at| candidate(FileType::Jpeg, at, 4))
            .collect();
        let index = FooterIndex::build(&registry, &source, &candidates, &|| false);
        let direct = BoundaryResolver::new(&registry);
        let indexed = BoundaryResolver::new(&registry).with_footer_index(&index);

        for c in &candidates {
            assert_eq!(
                indexed.resolve(c, &source).unwrap(),
                direct.resolve(c, &source).unwrap()
            );
        }
        assert_eq!(indexed.resolve(&candidates[1], &source).unwrap().end_offset, 2002);
        assert_eq!(indexed.resolve(&candidates[2], &source).unwrap().end_offset, 8192);
    }

    #[test]
    fn test_footer_search_crosses_chunks() {
        let registry = SignatureRegistry::builtin();
        let resolver = BoundaryResolver::new(&registry);

        // Straddles the end of the first search chunk
        let footer_at = 8 + FOOTER_SEARCH_CHUNK + 3;
        let mut data = vec![0u8; footer_at + 64];
        data[..8].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        data[footer_at..footer_at + 8].copy_from_slice(&[0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]);
        let source = MemorySource::new("mem", data);

        let resolution = resolver.resolve(&candidate(FileType::Png, 0, 8), &source).unwrap();
        assert_eq!(resolution.end_offset, footer_at as u64 + 8);
        assert_eq!(resolution.confidence, Confidence::High);
    }
}
