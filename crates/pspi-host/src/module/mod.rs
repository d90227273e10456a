//! Filter modules and their entry points.
//!
//! The state machine only ever calls a module through [`EntryPoint`]. The
//! native implementation resolves the exported symbol once and keeps the
//! library loaded for as long as the entry point lives.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use crate::abi::{FilterEntryFn, OsErr, Selector, codes};
use crate::error::PluginError;

/// A callable filter entry point.
pub trait EntryPoint {
    /// Calls the entry point with `selector` and returns its result code.
    ///
    /// # Safety
    ///
    /// `record` must point at a live filter record, or at an about record
    /// for [`Selector::About`], and `data` at the data token. Both must stay
    /// valid for the whole call.
    unsafe fn invoke(&self, selector: Selector, record: *mut c_void, data: *mut isize) -> OsErr;
}

/// Produces entry points for modules on disk.
pub trait ModuleLoader {
    /// Resolves `symbol` in the module at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ModuleLoad`] when the module cannot be loaded
    /// and [`PluginError::EntrySymbolUnresolvable`] when the symbol is
    /// missing.
    fn entry_point(&self, path: &Path, symbol: &str) -> Result<Box<dyn EntryPoint>, PluginError>;
}

/// Loads modules with the platform's dynamic loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn entry_point(&self, path: &Path, symbol: &str) -> Result<Box<dyn EntryPoint>, PluginError> {
        let module = LoadedModule::open(path)?;
        Ok(Box::new(module.entry_point(symbol)?))
    }
}

/// A loaded native module.
#[derive(Clone)]
pub struct LoadedModule {
    path: PathBuf,
    library: Arc<Library>,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LoadedModule {
    /// Loads the module at `path`.
    ///
    /// Loading runs the module's initialisation code.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ModuleLoad`] when the loader fails.
    pub fn open(module: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = module.as_ref().to_path_buf();
        // SAFETY: filter modules are trusted native code whose
        // initialisation routines are run as part of hosting them.
        let library = unsafe { Library::new(&path) }.map_err(|source| PluginError::ModuleLoad {
            path: path.clone(),
            source: Arc::new(source),
        })?;
        debug!(path = %path.display(), "module loaded");
        Ok(Self {
            path,
            library: Arc::new(library),
        })
    }

    /// Path the module was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves an exported filter entry point.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::EntrySymbolUnresolvable`] when the module does
    /// not export `symbol`.
    pub fn entry_point(&self, symbol: &str) -> Result<ModuleEntryPoint, PluginError> {
        // SAFETY: manifests declare this symbol as a filter entry point,
        // whose signature is fixed by the plug-in interface.
        let function = unsafe { self.library.get::<FilterEntryFn>(symbol.as_bytes()) }
            .map(|resolved| *resolved)
            .map_err(|_| PluginError::EntrySymbolUnresolvable {
                path: self.path.clone(),
                symbol: symbol.to_owned(),
            })?;
        Ok(ModuleEntryPoint {
            symbol: symbol.to_owned(),
            function,
            _library: Arc::clone(&self.library),
        })
    }
}

/// An entry point resolved from a loaded module.
pub struct ModuleEntryPoint {
    symbol: String,
    function: FilterEntryFn,
    _library: Arc<Library>,
}

impl ModuleEntryPoint {
    /// The exported symbol name.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Debug for ModuleEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntryPoint")
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

impl EntryPoint for ModuleEntryPoint {
    unsafe fn invoke(&self, selector: Selector, record: *mut c_void, data: *mut isize) -> OsErr {
        let mut result = codes::NO_ERR;
        // SAFETY: the caller upholds the record and data contract, and the
        // library stays loaded while `self` holds it.
        unsafe { (self.function)(selector.code(), record, data, &raw mut result) };
        result
    }
}
