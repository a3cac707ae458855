//! Data Transfer Objects

mod scan_config;

pub use scan_config::{ConfigError, OverlapPolicy, ScanConfig};
