//! Logging configuration.
//!
//! The platform collects the component's stdout as the job log and shows
//! stderr as the failure message, so log lines go to stdout.

use tracing_subscriber::EnvFilter;

/// Initializes logging to stdout, `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(false)
        .init();
}
