//! Command execution on behalf of the host.
//!
//! The [`FilterRunner`] is what the host's procedure dispatcher calls. It
//! resolves a command through the [`FilterRegistry`], loads the entry point
//! through a [`ModuleLoader`], drives a [`FilterSession`] in the requested
//! [`RunMode`] and keeps per-command state in a [`StateStore`]. The settings
//! command lives here too, since it rebuilds the registry.
//!
//! The loader abstraction enables test doubles that run scripted entry
//! points without loading native code.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Completion, PluginError};
use crate::filter::{FilterSession, Step, show_about};
use crate::handle::HandleArena;
use crate::host::{FilterHost, PixelFormat, StateStore};
use crate::manifest::ImageTypes;
use crate::module::{EntryPoint, ModuleLoader};
use crate::registry::discovery;
use crate::registry::{CommandTarget, FilterRegistry};

/// Most directories the search path may hold.
pub const MAX_SEARCH_PATH: usize = 10;

/// How a command was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// The user may be asked for parameters.
    Interactive,
    /// Parameters come from the command's arguments or saved state.
    NonInteractive,
    /// Repeat the last run with the saved parameters.
    WithLastValues,
}

/// Lets the user edit the search path.
pub trait PathEditor {
    /// Returns the edited search path, or `None` when the user cancelled.
    fn edit(&mut self, current: &[PathBuf]) -> Option<Vec<PathBuf>>;
}

/// Resolves and runs filter, about and settings commands.
///
/// # Example
///
/// ```
/// use pspi_host::host::MemoryStateStore;
/// use pspi_host::module::NativeLoader;
/// use pspi_host::registry::FilterRegistry;
/// use pspi_host::runner::{FilterRunner, RunMode};
///
/// let runner = FilterRunner::new(FilterRegistry::new(), NativeLoader, MemoryStateStore::new());
/// let error = runner
///     .run_about("help_about_photoshop_plug_in_missing_x", RunMode::Interactive)
///     .expect_err("nothing is registered");
/// assert!(matches!(error, pspi_host::PluginError::UnknownCommand { .. }));
/// ```
pub struct FilterRunner<L, S> {
    registry: FilterRegistry,
    loader: L,
    store: S,
    search_path: Vec<PathBuf>,
}

impl<L, S> fmt::Debug for FilterRunner<L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRunner")
            .field("registry", &self.registry)
            .field("search_path", &self.search_path)
            .finish_non_exhaustive()
    }
}

impl<L, S> FilterRunner<L, S> {
    /// Creates a runner over `registry`.
    #[must_use]
    pub const fn new(registry: FilterRegistry, loader: L, store: S) -> Self {
        Self {
            registry,
            loader,
            store,
            search_path: Vec::new(),
        }
    }

    /// Uses `search_path` for later rescans.
    #[must_use]
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    /// The registry commands are resolved against.
    #[must_use]
    pub const fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// The state store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The search path of the last scan.
    #[must_use]
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Replaces the search path and rescans it.
    ///
    /// Modules unchanged since the previous scan keep their entries.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Calling`] unless between one and
    /// [`MAX_SEARCH_PATH`] directories are given.
    pub fn apply_settings(&mut self, search_path: Vec<PathBuf>) -> Result<Completion, PluginError> {
        if search_path.is_empty() || search_path.len() > MAX_SEARCH_PATH {
            return Err(PluginError::Calling {
                message: format!(
                    "the search path needs between 1 and {MAX_SEARCH_PATH} directories, got {}",
                    search_path.len()
                ),
            });
        }
        self.registry = discovery::scan(&search_path, &self.registry);
        self.search_path = search_path;
        Ok(Completion::Completed)
    }

    /// Lets `editor` change the search path, then rescans it.
    ///
    /// # Errors
    ///
    /// As for [`apply_settings`](Self::apply_settings).
    pub fn edit_settings(&mut self, editor: &mut dyn PathEditor) -> Result<Completion, PluginError> {
        match editor.edit(&self.search_path) {
            Some(search_path) => self.apply_settings(search_path),
            None => {
                info!("search path edit cancelled");
                Ok(Completion::Cancelled)
            }
        }
    }
}

impl<L: ModuleLoader, S: StateStore> FilterRunner<L, S> {
    /// Applies the filter registered as `command` to `host`.
    ///
    /// Interactive runs query parameters first and save them; the other
    /// modes replay the saved state, if any. A cancelled parameter query
    /// leaves the saved state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownCommand`] for unregistered commands,
    /// [`PluginError::UnsupportedImageType`] for drawables the entry does
    /// not accept, loader and state-store errors, and
    /// [`PluginError::Execution`] when the module fails.
    pub fn run_filter(
        &mut self,
        command: &str,
        mode: RunMode,
        host: &mut dyn FilterHost,
    ) -> Result<Completion, PluginError> {
        let Some(CommandTarget::Filter { module, entry }) = self.registry.resolve(command) else {
            return Err(unknown(command));
        };
        let format = host.pixel_format();
        if !accepts(entry.image_types(), format) {
            return Err(PluginError::UnsupportedImageType {
                image_type: format.to_string(),
            });
        }
        info!(command, ?mode, module = %module.path().display(), "running filter");
        let entry_point = self.loader.entry_point(module.path(), entry.entry_symbol())?;
        let session = FilterSession::new(&*entry_point, host, HandleArena::new());

        let prepared = match mode {
            RunMode::Interactive => {
                let Step::Ready(queried) = session.query_parameters()? else {
                    return Ok(Completion::Cancelled);
                };
                self.store.save(command, &queried.persisted_state())?;
                queried.prepare()?
            }
            RunMode::NonInteractive | RunMode::WithLastValues => {
                let saved = self.store.load(command)?;
                debug!(command, found = saved.is_some(), "loaded saved state");
                session.prepare(saved.as_ref())?
            }
        };
        match prepared {
            Step::Ready(ready) => ready.run(),
            Step::Cancelled => Ok(Completion::Cancelled),
        }
    }

    /// Shows the about box of the module behind `command`.
    ///
    /// Only interactive runs show anything; other modes succeed at once.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownCommand`] for unregistered commands,
    /// loader errors, and [`PluginError::Execution`] when the module fails.
    pub fn run_about(&self, command: &str, mode: RunMode) -> Result<Completion, PluginError> {
        let Some(CommandTarget::About { module }) = self.registry.resolve(command) else {
            return Err(unknown(command));
        };
        if mode != RunMode::Interactive {
            debug!(command, "about box skipped outside interactive mode");
            return Ok(Completion::Completed);
        }
        let entry_points = module
            .entries()
            .iter()
            .map(|entry| self.loader.entry_point(module.path(), entry.entry_symbol()))
            .collect::<Result<Vec<_>, _>>()?;
        let entries: Vec<&dyn EntryPoint> = entry_points.iter().map(|entry| &**entry).collect();
        show_about(&entries, HandleArena::new())
    }
}

fn accepts(types: ImageTypes, format: PixelFormat) -> bool {
    match format {
        PixelFormat::Rgb | PixelFormat::Rgba => types.rgb,
        PixelFormat::Gray | PixelFormat::GrayA => types.gray,
        PixelFormat::Indexed | PixelFormat::IndexedA => false,
    }
}

fn unknown(command: &str) -> PluginError {
    PluginError::UnknownCommand {
        name: command.to_owned(),
    }
}
