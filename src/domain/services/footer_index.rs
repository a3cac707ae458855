//! Footer index
//!
//! Records every footer occurrence inside the ranges that footer-delimited
//! candidates may search, in a single pass. Resolving a candidate is then a
//! lookup instead of a read of up to `max_size` bytes, so dense images cost
//! one extra read of the source rather than one per candidate.

use crate::domain::entities::{Candidate, LengthMode};
use crate::domain::repositories::ByteSource;
use crate::domain::services::SignatureRegistry;
use aho_corasick::{AhoCorasick, MatchKind};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::Range;

/// Bytes owned by one indexing task (1 MiB)
pub const FOOTER_INDEX_CHUNK: u64 = 1024 * 1024;

/// Answer to a footer lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterLookup {
    /// End offset of the first qualifying footer, trailer included
    Found(u64),
    /// No qualifying footer anywhere in the range
    Absent,
    /// Part of the range was not indexed; the source must be searched directly
    Unknown,
}

enum ChunkScan {
    Hits(Vec<(usize, u64)>),
    Missing(Range<u64>),
}

/// Footer positions for one scan
#[derive(Debug, Default)]
pub struct FooterIndex {
    /// Merged, sorted ranges that were indexed
    covered: Vec<Range<u64>>,
    /// Sorted footer start offsets per footer byte string
    positions: HashMap<Vec<u8>, Vec<u64>>,
    /// Chunks that could not be read or were skipped after a stop request
    missing: Vec<Range<u64>>,
}

impl FooterIndex {
    /// Indexes the footer search ranges of `candidates`
    ///
    /// Chunks are read in parallel on the current rayon pool. `stop` is
    /// polled before each chunk; skipped and unreadable chunks are recorded
    /// so lookups touching them answer [`FooterLookup::Unknown`].
    pub fn build(
        registry: &SignatureRegistry,
        source: &dyn ByteSource,
        candidates: &[Candidate],
        stop: &(dyn Fn() -> bool + Sync),
    ) -> Self {
        let source_len = source.len();
        let mut footers: Vec<Vec<u8>> = Vec::new();
        let mut spans = Vec::new();

        for candidate in candidates {
            let Some(spec) = registry.get(candidate.file_type()) else {
                continue;
            };
            if spec.length_mode() != LengthMode::FooterDelimited || spec.footers().is_empty() {
                continue;
            }

            let start = candidate.start_offset();
            let search_start = start.saturating_add(candidate.header_len() as u64);
            let cap = start.saturating_add(spec.max_size()).min(source_len);
            if search_start < cap {
                spans.push(search_start..cap);
            }
            for footer in spec.footers() {
                if !footers.contains(footer) {
                    footers.push(footer.clone());
                }
            }
        }

        let covered = merge(spans);
        if covered.is_empty() {
            return Self::default();
        }

        let matcher = match AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&footers)
        {
            Ok(ac) => ac,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build footer automaton, searching per candidate");
                return Self {
                    missing: covered.clone(),
                    covered,
                    positions: HashMap::new(),
                };
            }
        };
        let pad = footers.iter().map(Vec::len).max().unwrap_or(1).saturating_sub(1) as u64;

        let chunks: Vec<(u64, u64, u64)> = covered
            .iter()
            .flat_map(|range| {
                let range = range.clone();
                (range.start..range.end)
                    .step_by(FOOTER_INDEX_CHUNK as usize)
                    .map(move |chunk_start| {
                        let owned_end = (chunk_start + FOOTER_INDEX_CHUNK).min(range.end);
                        (chunk_start, owned_end, (owned_end + pad).min(range.end))
                    })
            })
            .collect();

        let scans: Vec<ChunkScan> = chunks
            .into_par_iter()
            .map(|(chunk_start, owned_end, read_end)| {
                if stop() {
                    return ChunkScan::Missing(chunk_start..owned_end);
                }

                let mut buffer = vec![0u8; (read_end - chunk_start) as usize];
                if let Err(e) = source.read_exact_at(chunk_start, &mut buffer) {
                    tracing::debug!(offset = chunk_start, error = %e, "footer index chunk unreadable");
                    return ChunkScan::Missing(chunk_start..owned_end);
                }

                let owned = (owned_end - chunk_start) as usize;
                ChunkScan::Hits(
                    matcher
                        .find_overlapping_iter(&buffer)
                        .filter(|m| m.start() < owned)
                        .map(|m| (m.pattern().as_usize(), chunk_start + m.start() as u64))
                        .collect(),
                )
            })
            .collect();

        let mut per_pattern: Vec<Vec<u64>> = vec![Vec::new(); footers.len()];
        let mut missing = Vec::new();
        for scan in scans {
            match scan {
                ChunkScan::Hits(hits) => {
                    for (pattern, offset) in hits {
                        per_pattern[pattern].push(offset);
                    }
                }
                ChunkScan::Missing(range) => missing.push(range),
            }
        }

        let positions = footers
            .into_iter()
            .zip(per_pattern)
            .map(|(footer, mut offsets)| {
                offsets.sort_unstable();
                offsets.dedup();
                (footer, offsets)
            })
            .collect();

        tracing::debug!(
            ranges = covered.len(),
            bytes = covered.iter().map(|r| r.end - r.start).sum::<u64>(),
            missing = missing.len(),
            "footer index built"
        );

        Self {
            covered,
            positions,
            missing,
        }
    }

    /// Whether nothing was indexed
    pub fn is_empty(&self) -> bool {
        self.covered.is_empty()
    }

    /// Finds the earliest footer that starts inside `search`, ends no later
    /// than `search.end` and no earlier than `min_end`
    ///
    /// The end offset includes `trailer` bytes after the footer.
    pub fn lookup(&self, footers: &[Vec<u8>], trailer: u64, search: Range<u64>, min_end: u64) -> FooterLookup {
        if search.is_empty() {
            return FooterLookup::Absent;
        }
        if !self
            .covered
            .iter()
            .any(|r| r.start <= search.start && search.end <= r.end)
        {
            return FooterLookup::Unknown;
        }

        // (footer offset, end offset)
        let mut first: Option<(u64, u64)> = None;
        for footer in footers {
            let Some(offsets) = self.positions.get(footer) else {
                return FooterLookup::Unknown;
            };
            let footer_len = footer.len() as u64;
            let lowest = search.start.max(min_end.saturating_sub(footer_len + trailer));
            let idx = offsets.partition_point(|&p| p < lowest);

            if let Some(&offset) = offsets.get(idx) {
                let end = offset + footer_len + trailer;
                if end <= search.end && first.is_none_or(|(best, _)| offset < best) {
                    first = Some((offset, end));
                }
            }
        }

        // Every possible footer start before the answer must have been indexed
        let limit = first.map_or(search.end, |(offset, _)| offset);
        if self
            .missing
            .iter()
            .any(|m| m.start < limit && search.start < m.end)
        {
            return FooterLookup::Unknown;
        }

        match first {
            Some((_, end)) => FooterLookup::Found(end),
            None => FooterLookup::Absent,
        }
    }
}

fn merge(mut spans: Vec<Range<u64>>) -> Vec<Range<u64>> {
    spans.sort_unstable_by_key(|r| r.start);

    let mut merged: Vec<Range<u64>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}
