//! qvtp utility - main entrypoint
// (c) 2025 Ross Younger

use std::process::ExitCode;

fn main() -> ExitCode {
    qvtp::main()
}
