//! Telemetry output formats for the pspi binary.
//!
//! Filter runs are usually driven by hand, so the human-readable compact
//! format is the default. JSON is meant for wrappers that collect the
//! host's diagnostics, and it never carries terminal colour codes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported telemetry output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event with the fields flattened.
    Json,
    /// Single-line text for a person watching stderr.
    #[default]
    Compact,
}

impl LogFormat {
    /// Returns `true` for machine-readable output.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Whether events may carry ANSI colour when stderr is `terminal`.
    #[must_use]
    pub const fn uses_colour(self, terminal: bool) -> bool {
        terminal && !self.is_structured()
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
