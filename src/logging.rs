//! Logging initialization.
//!
//! The contract orchestrator and the out-of-process inference daemon each
//! call `init()` once at startup. Verbosity is controlled the usual way
//! (`RUST_LOG`), defaulting to `info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call more than once
/// (subsequent calls are no-ops) so tests can call it freely.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = fmt().with_env_filter(filter).try_init();
}
