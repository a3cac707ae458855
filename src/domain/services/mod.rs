//! Domain services
//!
//! Core carving logic operating on domain entities: signature matching,
//! window scanning, boundary resolution, extraction and hashing.

mod boundary_resolver;
mod extractor;
mod footer_index;
pub mod integrity;
mod signature_registry;
mod window_scanner;

pub use boundary_resolver::{BoundaryError, BoundaryResolver, Resolution};
pub use extractor::{EXTRACTION_BUFFER_SIZE, ExtractError, ExtractedArtifact, Extractor};
pub use footer_index::{FOOTER_INDEX_CHUNK, FooterIndex, FooterLookup};
pub use signature_registry::{Capability, HeaderMatch, SignatureRegistry, builtin_signatures};
pub use window_scanner::{CandidateStream, DEFAULT_WINDOW_SIZE, ScannerError, WindowReadError, WindowScanner, check_geometry};
