//! Infrastructure layer
//!
//! Concrete implementations of the domain repositories: where bytes are
//! read from and where carved artifacts are written to.

pub mod persistence;
pub mod source;
