//! Observability setup.
//!
//! Structured logging via `tracing`; the `metrics` facade is used
//! throughout the crate and picks up whatever recorder the embedding
//! application installs.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter honors `RUST_LOG` and defaults to `repolens=info`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repolens=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
