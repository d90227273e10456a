//! Command-line runtime for the `pspi` filter host.
//!
//! The runtime splits configuration flags from the subcommand, loads the
//! layered [`Config`](pspi_config::Config), installs telemetry and then
//! dispatches to one of the subcommands:
//!
//! - `settings [DIR...]` replaces the search path and rescans it.
//! - `list` prints every installed filter and about command.
//! - `run COMMAND --input FILE --format F --width W --height H` filters a
//!   raw image file in place or into `--output`.
//! - `about COMMAND` shows a module's about box.
//!
//! Exit codes follow the host status of the command: `0` for success, `1`
//! for execution errors, `2` for calling errors and `3` when the user
//! cancelled.

mod cli;
mod commands;
mod config;
mod errors;
mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pspi_config::Config;
use pspi_host::{Completion, HostStatus};
use tracing::warn;

use self::cli::{Cli, CliCommand};
use self::config::split_arguments;
use self::errors::AppError;

const EXIT_SUCCESS: u8 = 0;
const EXIT_EXECUTION_ERROR: u8 = 1;
const EXIT_CALLING_ERROR: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

/// Runs the CLI using the provided arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    ExitCode::from(execute(args, stdout, stderr))
}

fn execute<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> u8
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let arguments: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&arguments);
    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            write!(stdout, "{}", error.render()).ok();
            return EXIT_SUCCESS;
        }
        Err(error) => return report(&AppError::CliUsage(error), stderr),
    };

    let result = Config::load_checked(split.config_arguments)
        .map_err(AppError::from)
        .and_then(|config| {
            telemetry::initialise(&config)?;
            dispatch(&config, cli.command, stdout)
        });

    match result {
        Ok(Completion::Completed) => EXIT_SUCCESS,
        Ok(Completion::Cancelled) => {
            writeln!(stderr, "cancelled").ok();
            EXIT_CANCELLED
        }
        Err(error) => report(&error, stderr),
    }
}

fn dispatch<W: Write>(
    config: &Config,
    command: CliCommand,
    stdout: &mut W,
) -> Result<Completion, AppError> {
    match command {
        CliCommand::Settings { directories } => commands::settings(config, directories, stdout),
        CliCommand::List => commands::list(config, stdout),
        CliCommand::Run(args) => commands::run(config, &args),
        CliCommand::About { command } => commands::about(config, &command),
    }
}

fn report<E: Write>(error: &AppError, stderr: &mut E) -> u8 {
    warn!(%error, "command failed");
    writeln!(stderr, "{error}").ok();
    match host_status(error) {
        HostStatus::CallingError => EXIT_CALLING_ERROR,
        HostStatus::Cancel => EXIT_CANCELLED,
        HostStatus::Success | HostStatus::ExecutionError => EXIT_EXECUTION_ERROR,
    }
}

const fn host_status(error: &AppError) -> HostStatus {
    match error {
        AppError::Plugin(plugin) => plugin.host_status(),
        AppError::CliUsage(_) | AppError::Configuration(_) => HostStatus::CallingError,
        _ => HostStatus::ExecutionError,
    }
}
