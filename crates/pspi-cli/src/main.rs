//! Entry point for the `pspi` binary.
//!
//! Delegates to [`pspi_cli::run`], which loads configuration, installs
//! telemetry and dispatches the requested subcommand.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    pspi_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
