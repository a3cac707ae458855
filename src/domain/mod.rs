//! Domain layer - Core carving logic
//!
//! Entities, repository traits and the services that scan, resolve,
//! extract and hash. Nothing here touches the filesystem directly.

pub mod entities;
pub mod repositories;
pub mod services;
