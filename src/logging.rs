//! Logging setup

use tracing_subscriber::EnvFilter;

/// Initialize tracing output to stdout
///
/// The log level comes from the RUST_LOG environment variable and
/// defaults to "info".
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stdout)
        .init();
}
