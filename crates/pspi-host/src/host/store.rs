//! Persistence of per-command plugin state between invocations.
//!
//! After a successful parameter query the plugin's opaque parameter block
//! and data token are saved under the filter command's name, so "repeat
//! last filter" and non-interactive runs replay the same settings.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PluginError;
use crate::handle::HandleRepresentation;

/// Saved copy of the plugin's parameter handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedParameters {
    /// How the plugin allocated the handle.
    pub representation: HandleRepresentation,
    /// Handle contents.
    pub bytes: Vec<u8>,
}

/// Everything remembered about the last run of one filter command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Parameter block, if the plugin produced one.
    pub parameters: Option<SavedParameters>,
    /// The plugin's scalar data token.
    pub data: isize,
}

/// Storage keyed by filter command name.
pub trait StateStore {
    /// Returns the state saved for `command`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::State`] or [`PluginError::Io`] when stored
    /// state exists but cannot be read.
    fn load(&self, command: &str) -> Result<Option<PersistedState>, PluginError>;

    /// Replaces the state saved for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::State`] or [`PluginError::Io`] when the state
    /// cannot be written.
    fn save(&mut self, command: &str, state: &PersistedState) -> Result<(), PluginError>;
}

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: HashMap<String, PersistedState>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, command: &str) -> Result<Option<PersistedState>, PluginError> {
        Ok(self.states.get(command).cloned())
    }

    fn save(&mut self, command: &str, state: &PersistedState) -> Result<(), PluginError> {
        self.states.insert(command.to_owned(), state.clone());
        Ok(())
    }
}

/// Store writing one JSON document per command into a directory.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    directory: PathBuf,
}

impl JsonStateStore {
    /// Creates a store rooted at `directory`, which is created on first
    /// save.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Directory holding the state files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, command: &str) -> PathBuf {
        self.directory.join(format!("{command}.json"))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, command: &str) -> Result<Option<PersistedState>, PluginError> {
        let path = self.path_for(command);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error(path, error)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|error| PluginError::State {
                message: format!("{}: {error}", path.display()),
            })
    }

    fn save(&mut self, command: &str, state: &PersistedState) -> Result<(), PluginError> {
        fs::create_dir_all(&self.directory).map_err(|error| io_error(self.directory.clone(), error))?;
        let path = self.path_for(command);
        let text = serde_json::to_string_pretty(state).map_err(|error| PluginError::State {
            message: error.to_string(),
        })?;
        fs::write(&path, text).map_err(|error| io_error(path.clone(), error))?;
        debug!(path = %path.display(), "saved filter state");
        Ok(())
    }
}

fn io_error(path: PathBuf, source: io::Error) -> PluginError {
    PluginError::Io {
        path,
        source: Arc::new(source),
    }
}
