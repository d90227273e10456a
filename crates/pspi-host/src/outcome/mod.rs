//! Centralized translation of plugin result codes.
//!
//! Every selector call site funnels the numeric result through
//! [`PluginOutcome::decode`], so cancellation, the report-string convention
//! and the catch-all code are interpreted identically for all phases.

use thiserror::Error;

use crate::abi::{OsErr, codes};

/// Decoded meaning of a non-success, non-cancel result code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginFailure {
    /// The module could not read a file.
    #[error("File read error")]
    ReadError,
    /// The module could not write a file.
    #[error("File write error")]
    WriteError,
    /// The module could not open a file.
    #[error("File open error")]
    OpenError,
    /// The disk is full.
    #[error("Disk full")]
    DiskFull,
    /// Unspecified file I/O failure.
    #[error("File I/O error")]
    IoError,
    /// The module ran out of memory.
    #[error("Out of memory")]
    OutOfMemory,
    /// The module received a null handle.
    #[error("Null handle error")]
    NullHandle,
    /// The module rejected its parameters.
    #[error("Bad parameters")]
    BadParameters,
    /// The module does not support the image mode.
    #[error("Unsupported image mode")]
    UnsupportedMode,
    /// The module needs a service this host lacks.
    #[error("Requires services not provided by this host")]
    HostCapabilityMissing,
    /// A property the module asked for is undefined.
    #[error("A requested property could not be found")]
    PropertyUndefined,
    /// The module needs a column step other than one.
    #[error("This host does not support colBytes other than 1")]
    UnsupportedColumnStep,
    /// The module asked for an invalid sample point.
    #[error("Invalid sample point")]
    InvalidSamplePoint,
    /// The module supplied its own message.
    #[error("{0}")]
    ReportedString(String),
    /// Any code without a known meaning.
    #[error("error code {0}")]
    Other(OsErr),
}

/// Interpretation of one entry-point result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    /// The call succeeded.
    Success,
    /// The user cancelled; never a malfunction.
    Cancelled,
    /// The call failed.
    Failed(PluginFailure),
}

impl PluginOutcome {
    /// Decodes `code`, reading the module's message only for the
    /// report-string code.
    ///
    /// Many modules return `1` to signal cancellation, so it is treated like
    /// the documented cancel code.
    ///
    /// # Example
    ///
    /// ```
    /// use pspi_host::outcome::{PluginFailure, PluginOutcome};
    ///
    /// assert_eq!(PluginOutcome::decode(0, || None), PluginOutcome::Success);
    /// assert_eq!(PluginOutcome::decode(-128, || None), PluginOutcome::Cancelled);
    /// assert_eq!(
    ///     PluginOutcome::decode(-108, || None),
    ///     PluginOutcome::Failed(PluginFailure::OutOfMemory)
    /// );
    /// ```
    pub fn decode(code: OsErr, report: impl FnOnce() -> Option<String>) -> Self {
        let failure = match code {
            codes::NO_ERR => return Self::Success,
            codes::USER_CANCELED_ERR | codes::LEGACY_CANCEL => return Self::Cancelled,
            codes::READ_ERR => PluginFailure::ReadError,
            codes::WRIT_ERR => PluginFailure::WriteError,
            codes::OPEN_ERR => PluginFailure::OpenError,
            codes::DSK_FUL_ERR => PluginFailure::DiskFull,
            codes::IO_ERR => PluginFailure::IoError,
            codes::MEM_FULL_ERR => PluginFailure::OutOfMemory,
            codes::NIL_HANDLE_ERR => PluginFailure::NullHandle,
            codes::FILTER_BAD_PARAMETERS => PluginFailure::BadParameters,
            codes::FILTER_BAD_MODE => PluginFailure::UnsupportedMode,
            codes::ERR_PLUG_IN_HOST_INSUFFICIENT => PluginFailure::HostCapabilityMissing,
            codes::ERR_PLUG_IN_PROPERTY_UNDEFINED => PluginFailure::PropertyUndefined,
            codes::ERR_HOST_DOES_NOT_SUPPORT_COL_STEP => PluginFailure::UnsupportedColumnStep,
            codes::ERR_INVALID_SAMPLE_POINT => PluginFailure::InvalidSamplePoint,
            codes::ERR_REPORT_STRING => {
                report().map_or(PluginFailure::Other(code), PluginFailure::ReportedString)
            }
            other => PluginFailure::Other(other),
        };
        Self::Failed(failure)
    }
}

/// Reads a Pascal string, clamping the length byte to the buffer.
#[must_use]
pub fn pascal_string(bytes: &[u8]) -> Option<String> {
    let (&length, rest) = bytes.split_first()?;
    let text = rest.get(..usize::from(length)).unwrap_or(rest);
    Some(String::from_utf8_lossy(text).into_owned())
}
