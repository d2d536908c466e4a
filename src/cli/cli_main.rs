//! Main CLI entrypoint
// (c) 2025 Ross Younger

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser as _;
use tracing::error;

use super::args::{CliArgs, Mode};

/// Main CLI entrypoint
///
/// Call this from `main`. Parses the process arguments, starts a tokio
/// runtime and runs the selected mode within it.
#[must_use]
pub fn cli() -> ExitCode {
    let args = CliArgs::parse();
    if let Err(e) = crate::util::setup_tracing(if args.debug { "debug" } else { "info" }) {
        eprintln!("failed to initialise tracing: {e:#}");
        return ExitCode::FAILURE;
    }
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: CliArgs) -> Result<()> {
    match args.mode {
        Mode::Client(options) => crate::client_main(options).await,
        Mode::Server(options) => crate::server_main(options).await,
    }
}
