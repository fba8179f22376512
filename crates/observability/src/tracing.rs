//! Tracing/logging initialization.
//!
//! JSON logs filtered via `RUST_LOG`. Saga runs, scan sweeps and recovery
//! sessions all log structured fields (transaction/session ids), so one
//! subscriber covers the whole pipeline.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops), which keeps
/// test binaries from fighting over the global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
