//! Filter command registry.
//!
//! The [`FilterRegistry`] maps host-visible command names onto the module
//! and entry point that implement them. It is filled by
//! [`discovery::scan`], persisted between processes as a JSON cache keyed
//! by module path and modification time, and replayed into the host
//! through a [`CommandInstaller`].

pub mod discovery;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PluginError;
use crate::manifest::{FilterManifest, ImageTypes};

/// Menu root for filter commands.
pub const FILTER_MENU_ROOT: &str = "<Image>/Filters/";

/// Menu root for about commands.
pub const ABOUT_MENU_ROOT: &str = "<Toolbox>/Help/About Photoshop plug-ins/";

const COMMAND_PREFIX: &str = "photoshop_plug_in_";
const ABOUT_PREFIX: &str = "help_about_";

/// Builds the filter command name for `symbol` in the module at `module`.
///
/// The name is lowercased and every byte that is not an ASCII letter or
/// digit becomes `_`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use pspi_host::registry::command_name;
///
/// let name = command_name(Path::new("/plugins/Eye Candy.8bf"), "DoFire");
/// assert_eq!(name, "photoshop_plug_in_eye_candy_dofire");
/// ```
#[must_use]
pub fn command_name(module: &Path, symbol: &str) -> String {
    let stem = module
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    format!("{COMMAND_PREFIX}{stem}_{symbol}")
        .bytes()
        .map(|byte| {
            if byte.is_ascii_alphanumeric() {
                char::from(byte.to_ascii_lowercase())
            } else {
                '_'
            }
        })
        .collect()
}

/// Name of the about command paired with `command`.
#[must_use]
pub fn about_command_name(command: &str) -> String {
    format!("{ABOUT_PREFIX}{command}")
}

/// Kind of command installed into the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Applies the filter to a drawable.
    Filter,
    /// Shows the module's about box.
    About,
}

/// One command registration handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Procedure name.
    pub name: String,
    /// Full menu path including its root.
    pub menu_path: String,
    /// Accepted drawable types; empty for about commands.
    pub image_types: String,
    /// Command kind.
    pub kind: CommandKind,
    /// Module implementing the command.
    pub module: PathBuf,
}

/// Receives the commands discovery produces.
pub trait CommandInstaller {
    /// Registers one command with the host.
    fn install_command(&mut self, command: &CommandSpec);
}

/// Collects installed commands in memory.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    commands: Vec<CommandSpec>,
}

impl CommandList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands in installation order.
    #[must_use]
    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }
}

impl CommandInstaller for CommandList {
    fn install_command(&mut self, command: &CommandSpec) {
        self.commands.push(command.clone());
    }
}

/// One filter entry point registered under a command name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    command: String,
    manifest: FilterManifest,
}

impl RegistryEntry {
    /// Names the entry described by `manifest` in the module at `module`.
    #[must_use]
    pub fn new(module: &Path, manifest: FilterManifest) -> Self {
        Self {
            command: command_name(module, manifest.entry_symbol()),
            manifest,
        }
    }

    /// Filter command name.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// About command name.
    #[must_use]
    pub fn about_command(&self) -> String {
        about_command_name(&self.command)
    }

    /// Exported symbol implementing the filter.
    #[must_use]
    pub fn entry_symbol(&self) -> &str {
        self.manifest.entry_symbol()
    }

    /// Drawable types the filter accepts.
    #[must_use]
    pub const fn image_types(&self) -> ImageTypes {
        self.manifest.image_types()
    }

    /// The validated manifest.
    #[must_use]
    pub const fn manifest(&self) -> &FilterManifest {
        &self.manifest
    }

    /// Filter menu path under [`FILTER_MENU_ROOT`].
    #[must_use]
    pub fn filter_menu_path(&self) -> String {
        format!("{FILTER_MENU_ROOT}{}", self.manifest.menu_path())
    }

    /// About menu path under [`ABOUT_MENU_ROOT`].
    #[must_use]
    pub fn about_menu_path(&self) -> String {
        format!("{ABOUT_MENU_ROOT}{}", self.manifest.menu_path())
    }
}

/// A module on disk and the entries it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    path: PathBuf,
    modified: SystemTime,
    entries: Vec<RegistryEntry>,
}

impl ModuleRecord {
    /// Creates a record for the module at `path` as of `modified`.
    #[must_use]
    pub const fn new(path: PathBuf, modified: SystemTime, entries: Vec<RegistryEntry>) -> Self {
        Self {
            path,
            modified,
            entries,
        }
    }

    /// Module path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time the entries were read at.
    #[must_use]
    pub const fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Entries in manifest order.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Returns `true` when the record describes the module as of `modified`.
    #[must_use]
    pub fn is_current(&self, modified: SystemTime) -> bool {
        self.modified == modified
    }
}

/// A command resolved to its module.
#[derive(Debug, Clone, Copy)]
pub enum CommandTarget<'a> {
    /// A filter command.
    Filter {
        /// Module implementing the entry.
        module: &'a ModuleRecord,
        /// The entry.
        entry: &'a RegistryEntry,
    },
    /// An about command, which addresses every entry of the module.
    About {
        /// Module whose about box is shown.
        module: &'a ModuleRecord,
    },
}

/// Registry of discovered modules keyed by path.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use std::time::SystemTime;
/// use pspi_host::registry::{FilterRegistry, ModuleRecord};
///
/// let mut registry = FilterRegistry::new();
/// registry.insert(ModuleRecord::new(
///     PathBuf::from("/plugins/empty.8bf"),
///     SystemTime::UNIX_EPOCH,
///     Vec::new(),
/// ));
/// assert_eq!(registry.len(), 1);
/// assert!(registry.resolve("photoshop_plug_in_empty_x").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRegistry {
    modules: BTreeMap<PathBuf, ModuleRecord>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` when no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Adds `record`, replacing any record for the same path.
    pub fn insert(&mut self, record: ModuleRecord) {
        self.modules.insert(record.path.clone(), record);
    }

    /// The record for the module at `path`.
    #[must_use]
    pub fn module(&self, path: &Path) -> Option<&ModuleRecord> {
        self.modules.get(path)
    }

    /// Modules ordered by path.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Every entry paired with its module.
    pub fn entries(&self) -> impl Iterator<Item = (&ModuleRecord, &RegistryEntry)> {
        self.modules
            .values()
            .flat_map(|module| module.entries.iter().map(move |entry| (module, entry)))
    }

    /// Resolves a filter or about command name.
    #[must_use]
    pub fn resolve(&self, command: &str) -> Option<CommandTarget<'_>> {
        if let Some(filter) = command.strip_prefix(ABOUT_PREFIX) {
            return self
                .find(filter)
                .map(|(module, _)| CommandTarget::About { module });
        }
        self.find(command)
            .map(|(module, entry)| CommandTarget::Filter { module, entry })
    }

    fn find(&self, command: &str) -> Option<(&ModuleRecord, &RegistryEntry)> {
        self.entries().find(|(_, entry)| entry.command == command)
    }

    /// Installs a filter and an about command for every entry.
    pub fn install(&self, installer: &mut dyn CommandInstaller) {
        for (module, entry) in self.entries() {
            installer.install_command(&CommandSpec {
                name: entry.command.clone(),
                menu_path: entry.filter_menu_path(),
                image_types: entry.image_types().to_string(),
                kind: CommandKind::Filter,
                module: module.path.clone(),
            });
            installer.install_command(&CommandSpec {
                name: entry.about_command(),
                menu_path: entry.about_menu_path(),
                image_types: String::new(),
                kind: CommandKind::About,
                module: module.path.clone(),
            });
        }
    }

    /// Loads a registry cache written by [`save`](Self::save).
    ///
    /// A missing cache is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the cache cannot be read and
    /// [`PluginError::State`] when it cannot be decoded.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(error) => return Err(io_error(path, error)),
        };
        let records: Vec<ModuleRecord> =
            serde_json::from_str(&text).map_err(|error| PluginError::State {
                message: format!("{}: {error}", path.display()),
            })?;
        debug!(path = %path.display(), modules = records.len(), "registry cache loaded");
        let mut registry = Self::new();
        for record in records {
            registry.insert(record);
        }
        Ok(registry)
    }

    /// Writes the registry as a JSON cache, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the cache cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PluginError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| io_error(parent, error))?;
        }
        let records: Vec<&ModuleRecord> = self.modules.values().collect();
        let text = serde_json::to_string_pretty(&records).map_err(|error| PluginError::State {
            message: error.to_string(),
        })?;
        fs::write(path, text).map_err(|error| io_error(path, error))?;
        debug!(path = %path.display(), modules = records.len(), "registry cache saved");
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> PluginError {
    PluginError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}
