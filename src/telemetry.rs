//! Logging setup for binaries embedding the engine
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the caller.

use tracing::Level;

/// Installs a formatted stderr subscriber at `level`
///
/// Returns `false` when a global subscriber was already set, so calling it
/// twice is harmless.
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
