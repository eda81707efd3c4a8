//! Tracing for following a run.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: progress and diagnostics via `RUST_LOG`, output
//!   to stderr. Not persisted.
//!
//! - **Attempt records (`io/attempt_log`)**: JSON and raw model replies under
//!   `.agentic-tdd/cycles/`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `agentic_tdd=info` so phase transitions and
/// commits are visible without configuration.
///
/// # Example
/// ```bash
/// RUST_LOG=agentic_tdd=debug agentic-tdd run kata.md
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentic_tdd=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
