use std::env;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Most directories the plugin search path may hold.
pub const MAX_SEARCH_PATH: usize = 10;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Name of the directory created under the user data directory.
pub const STATE_DIR_NAME: &str = "pspi";

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Computes the default directory for persisted state and the module cache.
///
/// Prefers the user's local data directory and falls back to the system
/// temporary directory when the platform reports none.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    let mut base = dirs::data_local_dir().unwrap_or_else(env::temp_dir);
    base.push(STATE_DIR_NAME);
    base
}
