//! Tracing setup for the binary.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Diagnostics go to stderr so they never interleave with streamed chat
/// output; verbosity follows `RUST_LOG`, defaulting to warnings.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
