//! Tracing initialisation.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=warung_db=trace` - Show trace for the persistence crate only
//! - Otherwise the configured default (`WARUNG_LOG`, `info` when unset)

use tracing_subscriber::EnvFilter;

/// Installs the process-wide fmt subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_filter},sqlx=warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
