//! Error types for the CLI runtime.

use std::io;
use std::path::PathBuf;

use pspi_config::ConfigError;
use pspi_host::PluginError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("failed to read image {}: {source}", path.display())]
    ReadImage { path: PathBuf, source: io::Error },
    #[error("failed to write image {}: {source}", path.display())]
    WriteImage { path: PathBuf, source: io::Error },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::Output(error)
    }
}
