//! Repository traits (interfaces)
//!
//! Contracts for the engine's external collaborators: where bytes are read
//! from and where carved artifacts go.

mod artifact_sink;
mod byte_source;

pub use artifact_sink::{ArtifactSink, ArtifactWriter, SinkError};
pub use byte_source::{ByteSource, SourceError};
