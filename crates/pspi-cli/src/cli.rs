//! Command-line interface definitions for the `pspi` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pspi_host::{PixelFormat, RunMode};

/// Runs legacy image-filter plug-ins against raw image files.
#[derive(Parser, Debug)]
#[command(name = "pspi", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Action to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Subcommands understood by `pspi`.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Replaces the plug-in search path and rescans it.
    Settings {
        /// Directories to scan, in order. Defaults to the configured path.
        #[arg(value_name = "DIR")]
        directories: Vec<PathBuf>,
    },
    /// Lists the commands installed from the search path.
    List,
    /// Runs a filter command over a raw interleaved 8-bit image file.
    Run(RunArgs),
    /// Shows the about box of the module behind an about command.
    About {
        /// About command name (for example `help_about_photoshop_plug_in_...`).
        #[arg(value_name = "COMMAND")]
        command: String,
    },
}

/// Arguments of `pspi run`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Filter command name.
    #[arg(value_name = "COMMAND")]
    pub(crate) command: String,
    /// Raw pixel file to read.
    #[arg(long, value_name = "FILE")]
    pub(crate) input: PathBuf,
    /// File receiving the filtered pixels. Defaults to the input file.
    #[arg(long, value_name = "FILE")]
    pub(crate) output: Option<PathBuf>,
    /// Pixel layout of the input file.
    #[arg(long, value_enum)]
    pub(crate) format: ImageFormat,
    /// Image width in pixels.
    #[arg(long)]
    pub(crate) width: u32,
    /// Image height in pixels.
    #[arg(long)]
    pub(crate) height: u32,
    /// How parameters are obtained.
    #[arg(long, value_enum, default_value_t = Mode::Interactive)]
    pub(crate) mode: Mode,
}

/// Raw image layouts accepted by `pspi run`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ImageFormat {
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
    /// One gray byte.
    Gray,
    /// Gray and alpha.
    Graya,
}

impl From<ImageFormat> for PixelFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Rgb => Self::Rgb,
            ImageFormat::Rgba => Self::Rgba,
            ImageFormat::Gray => Self::Gray,
            ImageFormat::Graya => Self::GrayA,
        }
    }
}

/// Run modes exposed on the command line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum Mode {
    /// Ask the plug-in for parameters and remember them.
    #[default]
    Interactive,
    /// Replay the remembered parameters without a dialog.
    NonInteractive,
    /// Replay the remembered parameters, as after "repeat last filter".
    LastValues,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Interactive => Self::Interactive,
            Mode::NonInteractive => Self::NonInteractive,
            Mode::LastValues => Self::WithLastValues,
        }
    }
}
