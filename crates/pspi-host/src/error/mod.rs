//! Domain errors raised by the plugin host.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O and loader errors are wrapped
//! in `Arc` to satisfy the `result_large_err` Clippy lint.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::abi::Selector;
use crate::outcome::PluginFailure;

/// Manifest fields that must be present for an entry to be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    /// The architecture-specific entry symbol.
    EntrySymbol,
    /// The menu category.
    Category,
    /// The menu name.
    Name,
}

impl std::fmt::Display for ManifestField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EntrySymbol => "entry symbol",
            Self::Category => "category",
            Self::Name => "name",
        })
    }
}

/// Errors arising from plugin discovery and invocation.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The module holds no resource with the requested identity.
    #[error("resource {resource_type}/{name} not found")]
    ResourceNotFound {
        /// Resource type that was looked up.
        resource_type: String,
        /// Resource name that was looked up.
        name: String,
    },

    /// The resource exists but its data could not be mapped.
    #[error("resource {name} could not be read: {message}")]
    ResourceLockFailed {
        /// Resource name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// The module image is not a well-formed executable.
    #[error("malformed module image: {message}")]
    MalformedResource {
        /// Description of the structural problem.
        message: String,
    },

    /// The manifest describes something other than a filter.
    #[error("not a filter plug-in (kind {kind})")]
    NotAFilterPlugin {
        /// Kind payload found in the manifest.
        kind: String,
    },

    /// The manifest header carries an unknown version.
    #[error("unsupported manifest version {version}")]
    UnsupportedManifestVersion {
        /// Version found in the header.
        version: i32,
    },

    /// The filter needs a newer interface than this host implements.
    #[error("filter interface {major}.{minor} is newer than this host supports")]
    UnsupportedInterfaceVersion {
        /// Declared major version.
        major: u16,
        /// Declared minor version.
        minor: u16,
    },

    /// None of the declared image modes can be represented by the host.
    #[error("no image mode supported by the filter is available")]
    NoCompatibleModes,

    /// A required manifest field is absent or empty.
    #[error("manifest lacks a {field}")]
    MissingRequiredField {
        /// Field that was missing.
        field: ManifestField,
    },

    /// The manifest stream ended early or is otherwise corrupt.
    #[error("malformed manifest: {message}")]
    MalformedManifest {
        /// Description of the problem.
        message: String,
    },

    /// The module does not export the entry symbol its manifest claims.
    #[error("entry symbol '{symbol}' does not resolve in {}", path.display())]
    EntrySymbolUnresolvable {
        /// Module path.
        path: PathBuf,
        /// Symbol that failed to resolve.
        symbol: String,
    },

    /// The native module could not be loaded.
    #[error("failed to load {}: {source}", path.display())]
    ModuleLoad {
        /// Module path.
        path: PathBuf,
        /// Loader error.
        #[source]
        source: Arc<libloading::Error>,
    },

    /// No filter or about command is registered under the name.
    #[error("command '{name}' is not registered")]
    UnknownCommand {
        /// Name that was looked up.
        name: String,
    },

    /// The host invoked a command with unusable arguments.
    #[error("calling error: {message}")]
    Calling {
        /// Description of the argument problem.
        message: String,
    },

    /// The drawable's pixel type has no filter mode equivalent.
    #[error("image type {image_type} is not supported")]
    UnsupportedImageType {
        /// Host image type.
        image_type: String,
    },

    /// The module failed while executing a phase.
    #[error("Problem invoking Photoshop plug-in: {phase}: {failure}")]
    Execution {
        /// Phase that failed.
        phase: Selector,
        /// Decoded failure reason.
        failure: PluginFailure,
    },

    /// Persisted invocation state could not be read or written.
    #[error("invocation state error: {message}")]
    State {
        /// Description of the failure.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl PluginError {
    /// Returns the status reported back to the host for this error.
    #[must_use]
    pub const fn host_status(&self) -> HostStatus {
        match self {
            Self::UnknownCommand { .. } | Self::Calling { .. } => HostStatus::CallingError,
            _ => HostStatus::ExecutionError,
        }
    }
}

/// How a command finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The command ran to the end.
    Completed,
    /// The user cancelled.
    Cancelled,
}

/// Status reported to the host's procedure dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// The command succeeded.
    Success,
    /// The user cancelled.
    Cancel,
    /// The command failed while executing.
    ExecutionError,
    /// The command was invoked incorrectly.
    CallingError,
}

impl HostStatus {
    /// Maps a command result onto a host status.
    #[must_use]
    pub const fn from_result(result: &Result<Completion, PluginError>) -> Self {
        match result {
            Ok(Completion::Completed) => Self::Success,
            Ok(Completion::Cancelled) => Self::Cancel,
            Err(error) => error.host_status(),
        }
    }
}
