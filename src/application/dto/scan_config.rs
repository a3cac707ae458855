//! Scan configuration DTO

use crate::domain::entities::{FileType, ScanMode};
use crate::domain::services::{DEFAULT_WINDOW_SIZE, ScannerError, SignatureRegistry, check_geometry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors in a scan configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid window geometry: {0}")]
    Window(#[from] ScannerError),

    #[error("Overlap {overlap} is below the longest header pattern; at least {required} is needed")]
    OverlapBelowMinimum { overlap: usize, required: usize },

    #[error("Candidate cap must be greater than zero")]
    ZeroCandidateCap,

    #[error("Quick extraction length must be greater than zero")]
    ZeroExtractLength,

    #[error("File type {0} is not in the signature registry")]
    UnknownType(FileType),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What to do with records whose byte ranges overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Keep every record with its own confidence
    #[default]
    RecordAll,
    /// Drop heuristic records fully inside a high-confidence record of
    /// another type, noting each drop in the report errors
    SuppressNestedHeuristic,
}

/// Options for one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// Bytes read per scan window
    pub window_size: usize,
    /// Bytes shared by consecutive windows (`None` = registry minimum)
    pub overlap: Option<usize>,
    /// Quick mode stops after this many candidates
    pub candidate_cap: usize,
    /// Bytes extracted per candidate in quick mode
    pub quick_extract_len: u64,
    pub output_directory: PathBuf,
    /// File types to search for (empty = all)
    pub enabled_types: Vec<FileType>,
    /// Worker threads for deep mode (0 = one per CPU)
    pub workers: usize,
    /// Place artifacts in one subdirectory per extension
    pub organize_by_type: bool,
    pub overlap_policy: OverlapPolicy,
    /// Memory-map file sources instead of positioned reads
    pub use_mmap: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Deep,
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: None,
            candidate_cap: 100,
            quick_extract_len: 1024 * 1024, // 1MB per quick-scan artifact
            output_directory: PathBuf::from("recovered"),
            enabled_types: Vec::new(),
            workers: 0,
            organize_by_type: false,
            overlap_policy: OverlapPolicy::RecordAll,
            use_mmap: false,
        }
    }
}

impl ScanConfig {
    /// Deep scan into `output_directory`
    pub fn deep(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            ..Default::default()
        }
    }

    /// Quick scan into `output_directory`
    pub fn quick(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            mode: ScanMode::Quick,
            output_directory: output_directory.into(),
            ..Default::default()
        }
    }

    /// Loads a configuration from JSON text; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Sets the file types to search for
    pub fn with_types(mut self, types: Vec<FileType>) -> Self {
        self.enabled_types = types;
        self
    }

    /// Sets window size and overlap
    pub fn with_window(mut self, window_size: usize, overlap: usize) -> Self {
        self.window_size = window_size;
        self.overlap = Some(overlap);
        self
    }

    pub fn with_candidate_cap(mut self, cap: usize) -> Self {
        self.candidate_cap = cap;
        self
    }

    pub fn with_quick_extract_len(mut self, len: u64) -> Self {
        self.quick_extract_len = len;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Sorts artifacts into per-extension subdirectories
    pub fn organized_by_type(mut self) -> Self {
        self.organize_by_type = true;
        self
    }

    pub fn memory_mapped(mut self) -> Self {
        self.use_mmap = true;
        self
    }

    /// Overlap actually used with `registry`
    pub fn effective_overlap(&self, registry: &SignatureRegistry) -> usize {
        self.overlap.unwrap_or_else(|| registry.min_overlap())
    }

    /// Worker count actually used
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Checks the configuration against the registry it will run with
    pub fn validate(&self, registry: &SignatureRegistry) -> Result<(), ConfigError> {
        for &file_type in &self.enabled_types {
            if !registry.contains(file_type) {
                return Err(ConfigError::UnknownType(file_type));
            }
        }

        let active = registry.filtered(&self.enabled_types);
        let overlap = self.effective_overlap(&active);
        check_geometry(self.window_size, overlap)?;

        if overlap < active.min_overlap() {
            return Err(ConfigError::OverlapBelowMinimum {
                overlap,
                required: active.min_overlap(),
            });
        }

        if self.mode == ScanMode::Quick {
            if self.candidate_cap == 0 {
                return Err(ConfigError::ZeroCandidateCap);
            }
            if self.quick_extract_len == 0 {
                return Err(ConfigError::ZeroExtractLength);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ScanConfig::from_json_str(
            r#"{"mode": "quick", "candidate_cap": 5, "enabled_types": ["png", "jpeg"]}"#,
        )
        .unwrap();

        assert_eq!(config.mode, ScanMode::Quick);
        assert_eq!(config.candidate_cap, 5);
        assert_eq!(config.enabled_types, vec![FileType::Png, FileType::Jpeg]);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.overlap_policy, OverlapPolicy::RecordAll);
    }

    #[test]
    fn test_overlap_derived_from_enabled_types() {
        let registry = SignatureRegistry::builtin();
        let config = ScanConfig::deep("out").with_types(vec![FileType::Png]);

        config.validate(&registry).unwrap();
        assert_eq!(config.effective_overlap(&registry.filtered(&config.enabled_types)), 7);
    }

    #[test]
    fn test_rejects_small_overlap() {
        let registry = SignatureRegistry::builtin();
        let config = ScanConfig::deep("out").with_window(1024, 3);

        assert!(matches!(
            config.validate(&registry),
            Err(ConfigError::OverlapBelowMinimum {
                overlap: 3,
                required: 48
            })
        ));
    }

    #[test]
    fn test_rejects_zero_cap_in_quick_mode_only() {
        let registry = SignatureRegistry::builtin();
        assert!(matches!(
            ScanConfig::quick("out").with_candidate_cap(0).validate(&registry),
            Err(ConfigError::ZeroCandidateCap)
        ));
        assert!(ScanConfig::deep("out").with_candidate_cap(0).validate(&registry).is_ok());
    }

    #[test]
    fn test_rejects_types_missing_from_registry() {
        let registry = SignatureRegistry::builtin().filtered(&[FileType::Png]);
        let config = ScanConfig::deep("out").with_types(vec![FileType::Gif]);

        assert!(matches!(
            config.validate(&registry),
            Err(ConfigError::UnknownType(FileType::Gif))
        ));
    }
}
