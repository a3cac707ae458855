//! Artifact sink implementations

mod local_file_sink;
mod memory_sink;

pub use local_file_sink::LocalFileSink;
pub use memory_sink::MemorySink;
