//! Logging configuration
//!
//! Initializes tracing for the binary. Output goes to stderr so container
//! logs on stdout stay clean.

/// Initializes logging with the specified level.
///
/// `RUST_LOG` overrides `level` when set. Calling this twice is harmless.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Level for a run: `debug` when requested, else `fallback`
#[must_use]
pub fn level_for(debug: bool, fallback: &str) -> &str {
    if debug { "debug" } else { fallback }
}
