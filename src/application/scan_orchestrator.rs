//! Scan orchestrator use case
//!
//! Drives one scan through its phases (scanning, resolving, extracting,
//! verifying) and assembles the [`ScanReport`]. Per-candidate failures are
//! recorded in the report; only preflight failures abort the scan.

use crate::application::cancellation::CancellationToken;
use crate::application::dto::{OverlapPolicy, ScanConfig};
use crate::application::error::FatalScanError;
use crate::domain::entities::{
    Candidate, CandidateError, Confidence, RecoveredFile, ScanError, ScanMode, ScanReport,
};
use crate::domain::repositories::{ArtifactSink, ByteSource};
use crate::domain::services::{
    BoundaryError, BoundaryResolver, ExtractError, ExtractedArtifact, Extractor, FooterIndex,
    Resolution, SignatureRegistry, WindowScanner, integrity,
};
use crate::infrastructure::persistence::LocalFileSink;
use crate::infrastructure::source::{FileSource, MmapSource};
use anyhow::Context;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

/// Lifecycle of a single scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    #[default]
    Idle,
    Scanning,
    Resolving,
    Extracting,
    Verifying,
    Completed,
    /// Preflight failed; nothing was scanned
    Failed,
}

impl ScanPhase {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Quick mode goes straight from scanning to extracting. Any running
    /// phase may complete early when the scan is cancelled or runs out of
    /// candidates.
    pub fn can_transition_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;

        matches!(
            (self, next),
            (Idle, Scanning)
                | (Idle, Failed)
                | (Scanning, Resolving)
                | (Scanning, Extracting)
                | (Resolving, Extracting)
                | (Extracting, Verifying)
                | (Scanning | Resolving | Extracting | Verifying, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Failed)
    }
}

/// Phase of one scan, observable from other threads
///
/// Create one per call to [`ScanOrchestrator::execute_with_progress`];
/// scans never share it.
#[derive(Debug, Default)]
pub struct ScanProgress {
    phase: Mutex<ScanPhase>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock()
    }

    fn advance(&self, next: ScanPhase) {
        let mut phase = self.phase.lock();
        debug_assert!(
            phase.can_transition_to(next),
            "invalid phase transition {:?} -> {:?}",
            *phase,
            next
        );
        tracing::info!(from = ?*phase, to = ?next, "scan phase");
        *phase = next;
    }
}

/// A candidate whose end has been resolved and that will be extracted
#[derive(Debug)]
struct PlannedExtraction {
    candidate: Candidate,
    resolution: Resolution,
}

/// Per-candidate results, kept in candidate order
#[derive(Debug, Default)]
struct CandidateOutcome {
    plan: Option<PlannedExtraction>,
    artifact: Option<ExtractedArtifact>,
    record: Option<RecoveredFile>,
    errors: Vec<ScanError>,
}

impl CandidateOutcome {
    fn failed(error: ScanError) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }
}

/// Scan orchestrator
///
/// Owns the configuration and the active signature registry, both
/// read-only. Each call to [`execute`](Self::execute) builds its own worker
/// pool, report and progress, so one orchestrator can run several scans,
/// including at the same time from different threads.
///
/// # Example
///
/// ```
/// use sigcarve::application::{CancellationToken, ScanConfig, ScanOrchestrator};
/// use sigcarve::infrastructure::persistence::MemorySink;
/// use sigcarve::infrastructure::source::MemorySource;
///
/// let orchestrator = ScanOrchestrator::new(ScanConfig::deep("unused")).unwrap();
/// let source = MemorySource::new("empty", Vec::new());
/// let report = orchestrator
///     .execute(&source, &MemorySink::new(), &CancellationToken::new())
///     .unwrap();
/// assert!(report.files_recovered().is_empty());
/// ```
pub struct ScanOrchestrator {
    config: ScanConfig,
    registry: SignatureRegistry,
}

impl ScanOrchestrator {
    /// Creates an orchestrator over the built-in signatures
    pub fn new(config: ScanConfig) -> Result<Self, FatalScanError> {
        Self::with_registry(config, &SignatureRegistry::builtin())
    }

    /// Creates an orchestrator over a custom registry
    ///
    /// Only the types enabled in `config` are kept.
    pub fn with_registry(config: ScanConfig, registry: &SignatureRegistry) -> Result<Self, FatalScanError> {
        config.validate(registry)?;
        Ok(Self {
            registry: registry.filtered(&config.enabled_types),
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Signatures active for this orchestrator's scans
    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// Runs one scan of `source`, writing artifacts into `sink`
    ///
    /// # Errors
    ///
    /// Only when the source cannot be read or the sink cannot be written at
    /// scan start. Candidate-level failures end up in [`ScanReport::errors`].
    pub fn execute(
        &self,
        source: &dyn ByteSource,
        sink: &dyn ArtifactSink,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, FatalScanError> {
        self.execute_with_progress(source, sink, cancel, &ScanProgress::new())
    }

    /// Like [`execute`](Self::execute), publishing phase changes to `progress`
    pub fn execute_with_progress(
        &self,
        source: &dyn ByteSource,
        sink: &dyn ArtifactSink,
        cancel: &CancellationToken,
        progress: &ScanProgress,
    ) -> Result<ScanReport, FatalScanError> {
        let start_time = Instant::now();
        let stop = || cancel.is_cancelled();

        let scanner = match self.preflight(source, sink) {
            Ok(scanner) => scanner,
            Err(e) => {
                progress.advance(ScanPhase::Failed);
                tracing::warn!(source = source.id(), error = %e, "scan aborted");
                return Err(e);
            }
        };

        let workers = match self.config.mode {
            ScanMode::Quick => 1,
            ScanMode::Deep => self.config.effective_workers(),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| FatalScanError::WorkerPool(e.to_string()))?;

        tracing::info!(
            source = source.id(),
            bytes = source.len(),
            mode = ?self.config.mode,
            workers,
            types = self.registry.len(),
            "starting scan"
        );

        let mut report = ScanReport::new(source.id(), self.config.mode);
        let mut errors = Vec::new();

        progress.advance(ScanPhase::Scanning);
        let candidates = match self.config.mode {
            ScanMode::Quick => self.scan_quick(&scanner, source, &stop, &mut report, &mut errors),
            ScanMode::Deep => pool.install(|| scan_deep(&scanner, source, workers, &stop, &mut report, &mut errors)),
        };
        report.set_candidates_found(candidates.len());
        tracing::info!(candidates = candidates.len(), "scan finished");

        let mut outcomes: Vec<CandidateOutcome> = match self.config.mode {
            ScanMode::Quick => {
                let resolver = BoundaryResolver::new(&self.registry);
                let source_len = source.len();
                candidates
                    .into_iter()
                    .map(|candidate| {
                        if cancel.is_cancelled() {
                            return CandidateOutcome::default();
                        }
                        let resolution =
                            resolver.quick_resolution(&candidate, source_len, self.config.quick_extract_len);
                        plan(candidate, resolution)
                    })
                    .collect()
            }
            ScanMode::Deep => {
                progress.advance(ScanPhase::Resolving);
                pool.install(|| {
                    let footer_index = FooterIndex::build(&self.registry, source, &candidates, &stop);
                    let resolver = BoundaryResolver::new(&self.registry).with_footer_index(&footer_index);
                    candidates
                        .into_par_iter()
                        .map(|candidate| {
                            if cancel.is_cancelled() {
                                return CandidateOutcome::default();
                            }
                            let resolution = resolver.resolve(&candidate, source);
                            plan(candidate, resolution)
                        })
                        .collect()
                })
            }
        };

        if self.config.overlap_policy == OverlapPolicy::SuppressNestedHeuristic {
            suppress_nested(&mut outcomes);
        }

        progress.advance(ScanPhase::Extracting);
        let extractor = Extractor::new();
        pool.install(|| {
            outcomes.par_iter_mut().for_each(|outcome| {
                if cancel.is_cancelled() {
                    return;
                }
                extract_one(&extractor, source, sink, outcome);
            })
        });

        progress.advance(ScanPhase::Verifying);
        pool.install(|| {
            outcomes
                .par_iter_mut()
                .for_each(|outcome| verify_one(sink, outcome))
        });

        for outcome in outcomes {
            errors.extend(outcome.errors);
            if let Some(record) = outcome.record {
                report.add_recovered(record);
            }
        }
        errors.sort_by_key(|e| e.offset);
        for error in errors {
            report.add_error(error);
        }

        if cancel.is_cancelled() {
            report.mark_partial();
            tracing::info!("scan cancelled, report is partial");
        }

        progress.advance(ScanPhase::Completed);
        tracing::info!(
            files = report.files_recovered().len(),
            errors = report.errors().len(),
            capped = report.is_capped(),
            elapsed_secs = start_time.elapsed().as_secs_f64(),
            "scan complete"
        );

        Ok(report)
    }

    /// Checks the source and sink, then builds the window scanner
    fn preflight<'a>(
        &'a self,
        source: &'a dyn ByteSource,
        sink: &dyn ArtifactSink,
    ) -> Result<WindowScanner<'a>, FatalScanError> {
        if !source.is_empty() {
            let mut first_byte = [0u8; 1];
            source
                .read_at(0, &mut first_byte)
                .map_err(|e| FatalScanError::SourceUnreadable {
                    source_id: source.id().to_string(),
                    source: e,
                })?;
        }

        sink.prepare().map_err(|e| FatalScanError::OutputUnwritable {
            location: sink.root().to_path_buf(),
            source: e,
        })?;

        let overlap = self.config.effective_overlap(&self.registry);
        WindowScanner::new(&self.registry, source, self.config.window_size, overlap)
            .map_err(|e| FatalScanError::InvalidConfig(e.into()))
    }

    /// Sequential scan that stops as soon as the candidate cap is reached
    fn scan_quick(
        &self,
        scanner: &WindowScanner<'_>,
        source: &dyn ByteSource,
        stop: &(dyn Fn() -> bool + Sync),
        report: &mut ScanReport,
        errors: &mut Vec<ScanError>,
    ) -> Vec<Candidate> {
        let cap = self.config.candidate_cap;
        let mut candidates = Vec::new();

        let mut stream = scanner.scan().interruptible(stop);
        while candidates.len() < cap {
            match stream.next() {
                Some(Ok(candidate)) => {
                    tracing::debug!(
                        file_type = %candidate.file_type(),
                        offset = candidate.start_offset(),
                        "candidate"
                    );
                    candidates.push(candidate);
                }
                Some(Err(e)) => errors.push(window_error(e)),
                None => break,
            }
        }

        if candidates.len() == cap && !stream.is_exhausted() {
            tracing::info!(cap, offset = stream.position(), "candidate cap reached");
            report.mark_capped();
        }

        let scanned = if stream.is_exhausted() {
            source.len()
        } else {
            stream.position()
        };
        report.set_bytes_scanned(scanned);
        candidates
    }
}

/// Parallel scan over independent ranges of the source
fn scan_deep(
    scanner: &WindowScanner<'_>,
    source: &dyn ByteSource,
    workers: usize,
    stop: &(dyn Fn() -> bool + Sync),
    report: &mut ScanReport,
    errors: &mut Vec<ScanError>,
) -> Vec<Candidate> {
    let per_range: Vec<(Vec<_>, u64)> = partition(source.len(), workers)
        .into_par_iter()
        .map(|range| {
            let range_start = range.start;
            let mut stream = scanner.scan_range(range).interruptible(stop);
            let items: Vec<_> = stream.by_ref().collect();
            (items, stream.position() - range_start)
        })
        .collect();

    report.set_bytes_scanned(per_range.iter().map(|(_, scanned)| scanned).sum());

    let mut candidates = Vec::new();
    for item in per_range.into_iter().flat_map(|(items, _)| items) {
        match item {
            Ok(candidate) => {
                tracing::debug!(
                    file_type = %candidate.file_type(),
                    offset = candidate.start_offset(),
                    "candidate"
                );
                candidates.push(candidate);
            }
            Err(e) => errors.push(window_error(e)),
        }
    }
    candidates.sort_by_key(Candidate::sort_key);
    candidates
}

/// Splits `[0, len)` into at most `parts` contiguous ranges
pub(crate) fn partition(len: u64, parts: usize) -> Vec<Range<u64>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = (parts.max(1) as u64).min(len);
    let step = len.div_ceil(parts);

    (0..parts)
        .map(|i| i * step..((i + 1) * step).min(len))
        .filter(|r| !r.is_empty())
        .collect()
}

fn window_error(e: crate::domain::services::WindowReadError) -> ScanError {
    tracing::warn!(offset = e.offset, error = %e.source, "unreadable scan window");
    ScanError::new(
        e.offset,
        None,
        CandidateError::ReadFailure {
            offset: e.offset,
            reason: e.source.to_string(),
        },
    )
}

fn plan(candidate: Candidate, resolution: Result<Resolution, BoundaryError>) -> CandidateOutcome {
    let offset = candidate.start_offset();
    let file_type = candidate.file_type();

    match resolution {
        Ok(resolution) => {
            let mut outcome = CandidateOutcome::default();
            if let Some(declared) = resolution.rejected_declared_length {
                tracing::warn!(file_type = %file_type, offset, declared, "inconsistent declared length");
                outcome.errors.push(ScanError::new(
                    offset,
                    Some(file_type),
                    CandidateError::InconsistentDeclaredLength { declared },
                ));
            }
            outcome.plan = Some(PlannedExtraction {
                candidate,
                resolution,
            });
            outcome
        }
        Err(BoundaryError::Truncated { available, min_size }) => {
            tracing::warn!(file_type = %file_type, offset, available, min_size, "truncated candidate");
            CandidateOutcome::failed(ScanError::new(
                offset,
                Some(file_type),
                CandidateError::Truncated { available, min_size },
            ))
        }
        Err(BoundaryError::Read { offset: at, source }) => {
            tracing::warn!(file_type = %file_type, offset, error = %source, "boundary read failed");
            CandidateOutcome::failed(ScanError::new(
                offset,
                Some(file_type),
                CandidateError::ReadFailure {
                    offset: at,
                    reason: source.to_string(),
                },
            ))
        }
        Err(e @ BoundaryError::UnknownType(_)) => {
            tracing::warn!(offset, error = %e, "candidate skipped");
            CandidateOutcome::default()
        }
    }
}

/// Drops heuristic plans nested inside a high-confidence plan of another type
fn suppress_nested(outcomes: &mut [CandidateOutcome]) {
    let high: Vec<(Candidate, u64)> = outcomes
        .iter()
        .filter_map(|o| o.plan.as_ref())
        .filter(|p| p.resolution.confidence == Confidence::High)
        .map(|p| (p.candidate.clone(), p.resolution.end_offset))
        .collect();

    for outcome in outcomes.iter_mut() {
        let Some(plan) = &outcome.plan else { continue };
        if plan.resolution.confidence != Confidence::Heuristic {
            continue;
        }

        let start = plan.candidate.start_offset();
        let end = plan.resolution.end_offset;
        let container = high.iter().find(|(outer, outer_end)| {
            outer.file_type() != plan.candidate.file_type()
                && outer.start_offset() <= start
                && end <= *outer_end
        });

        if let Some((outer, _)) = container {
            tracing::debug!(
                file_type = %plan.candidate.file_type(),
                offset = start,
                by = %outer.file_type(),
                "nested heuristic record suppressed"
            );
            outcome.errors.push(ScanError::new(
                start,
                Some(plan.candidate.file_type()),
                CandidateError::SupersededByOverlap {
                    by: outer.file_type(),
                    by_offset: outer.start_offset(),
                },
            ));
            outcome.plan = None;
        }
    }
}

fn extract_one(extractor: &Extractor, source: &dyn ByteSource, sink: &dyn ArtifactSink, outcome: &mut CandidateOutcome) {
    let Some(plan) = &outcome.plan else { return };
    let file_type = plan.candidate.file_type();
    let start = plan.candidate.start_offset();

    match extractor.extract(source, sink, file_type, start, plan.resolution.end_offset) {
        Ok(artifact) => outcome.artifact = Some(artifact),
        Err(ExtractError::ReadFailure { offset, source }) => {
            tracing::warn!(file_type = %file_type, offset = start, at = offset, error = %source, "extraction read failed");
            outcome.errors.push(ScanError::new(
                start,
                Some(file_type),
                CandidateError::ReadFailure {
                    offset,
                    reason: source.to_string(),
                },
            ));
        }
        Err(ExtractError::WriteFailure { artifact, source }) => {
            tracing::warn!(file_type = %file_type, offset = start, artifact = %artifact, error = %source, "extraction write failed");
            outcome.errors.push(ScanError::new(
                start,
                Some(file_type),
                CandidateError::WriteFailure {
                    artifact,
                    reason: source.to_string(),
                },
            ));
        }
    }
}

fn verify_one(sink: &dyn ArtifactSink, outcome: &mut CandidateOutcome) {
    let (Some(plan), Some(artifact)) = (&outcome.plan, &outcome.artifact) else {
        return;
    };
    let file_type = plan.candidate.file_type();
    let start = plan.candidate.start_offset();

    let hashed = sink
        .open(&artifact.location)
        .map_err(|e| e.to_string())
        .and_then(|mut reader| integrity::verify(&mut *reader, artifact.bytes_written).map_err(|e| e.to_string()));

    match hashed {
        Ok(content_hash) => {
            outcome.record = RecoveredFile::new(
                file_type,
                start,
                plan.resolution.end_offset,
                content_hash,
                plan.resolution.confidence,
                artifact.location.clone(),
            );
        }
        Err(reason) => {
            tracing::warn!(file_type = %file_type, offset = start, error = %reason, "artifact unreadable after write");
            outcome.errors.push(ScanError::new(
                start,
                Some(file_type),
                CandidateError::WriteFailure {
                    artifact: artifact.location.display().to_string(),
                    reason,
                },
            ));
        }
    }
}

/// Scans the file or device at `source_path` using `config`
///
/// Opens the source, writes artifacts under `config.output_directory` and
/// returns the finished report. The typed [`FatalScanError`] is available
/// through `downcast_ref` on the returned error.
pub fn run_scan(source_path: impl AsRef<Path>, config: &ScanConfig) -> anyhow::Result<ScanReport> {
    let source_path = source_path.as_ref();
    let orchestrator = ScanOrchestrator::new(config.clone()).context("invalid scan configuration")?;

    let source: Box<dyn ByteSource> = if config.use_mmap {
        MmapSource::open(source_path).map(|s| Box::new(s) as Box<dyn ByteSource>)
    } else {
        FileSource::open(source_path).map(|s| Box::new(s) as Box<dyn ByteSource>)
    }
    .map_err(|e| FatalScanError::SourceUnreadable {
        source_id: source_path.display().to_string(),
        source: e,
    })
    .with_context(|| format!("failed to open {}", source_path.display()))?;

    let sink = LocalFileSink::new(&config.output_directory).organize_by_type(config.organize_by_type);

    orchestrator
        .execute(source.as_ref(), &sink, &CancellationToken::new())
        .with_context(|| format!("scan of {} failed", source_path.display()))
}
