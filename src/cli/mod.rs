//! Command line interface for qvtp
// (c) 2025 Ross Younger
mod args;
mod cli_main;
pub(crate) use args::{ClientOptions, ServerOptions};
pub use cli_main::cli;
