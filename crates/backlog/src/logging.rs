//! Logging configuration using the tracing ecosystem.
//!
//! Output goes to stderr so that `--json` output on stdout stays parseable.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Default log level if RUST_LOG is not set.
const DEFAULT_LOG_FILTER: &str = "backlog=info,backlog_core=info,warn";

/// Initialize the logging system.
///
/// Configure verbosity via `RUST_LOG`, e.g. `RUST_LOG=backlog_core=debug`
/// to see every API request.
pub fn init() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "backlog starting up");
    Ok(())
}
