//! Tracing helpers
// (c) 2025 Ross Younger

use anyhow::Result;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable that controls what gets logged
const STANDARD_ENV_VAR: &str = "RUST_LOG";

/// Initialises the tracing subsystem.
///
/// Output goes to stderr. `RUST_LOG`, if set, takes precedence over the
/// given default level.
pub(crate) fn setup(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(STANDARD_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    Ok(())
}
