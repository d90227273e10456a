//! Shared configuration for the pspi binary.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a
//! configuration file (`--config-path` or `PSPI_CONFIG_PATH`), then
//! `PSPI_*` environment variables, then command-line flags. Each later
//! layer overrides the earlier ones field by field.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use self::defaults::{
    DEFAULT_LOG_FILTER, MAX_SEARCH_PATH, STATE_DIR_NAME, default_log_filter,
    default_log_filter_string, default_log_format, default_state_dir,
};
pub use self::logging::{LogFormat, LogFormatParseError};

/// File name of the module cache inside the state directory.
pub const MODULE_CACHE_FILE: &str = "modules.json";

/// Directory holding saved filter parameters inside the state directory.
pub const PARAMETERS_DIR: &str = "parameters";

/// Resolved configuration for the pspi binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PSPI")]
pub struct Config {
    /// Ordered directories scanned for filter modules.
    #[ortho_config(default = Vec::new())]
    pub search_path: Vec<PathBuf>,
    /// Directory for saved parameters and the module cache.
    pub state_dir: Option<PathBuf>,
    /// Tracing filter expression applied to telemetry output.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format used for telemetry.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            state_dir: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration layer could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// The search path lists more directories than a host may scan.
    #[error("the search path holds {count} directories; at most {MAX_SEARCH_PATH} are allowed")]
    SearchPathTooLong {
        /// Number of configured directories.
        count: usize,
    },
}

impl Config {
    /// Loads every configuration layer from `args` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer is malformed and
    /// [`ConfigError::SearchPathTooLong`] when more than
    /// [`MAX_SEARCH_PATH`] directories are configured.
    pub fn load_checked<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let config = Self::load_from_iter(args).map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the layers cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SearchPathTooLong`] when more than
    /// [`MAX_SEARCH_PATH`] directories are configured.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        let count = self.search_path.len();
        if count > MAX_SEARCH_PATH {
            return Err(ConfigError::SearchPathTooLong { count });
        }
        Ok(())
    }

    /// Directories scanned for filter modules, in order.
    #[must_use]
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Directory for persisted state, falling back to [`default_state_dir`].
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// Location of the module cache.
    #[must_use]
    pub fn module_cache_path(&self) -> PathBuf {
        self.state_dir().join(MODULE_CACHE_FILE)
    }

    /// Directory holding saved filter parameters.
    #[must_use]
    pub fn parameters_dir(&self) -> PathBuf {
        self.state_dir().join(PARAMETERS_DIR)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests;
