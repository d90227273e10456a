//! Filter plug-in emulation for the pspi host.
//!
//! The `pspi-host` crate runs compiled filter modules written against the
//! legacy image-filter plug-in interface inside a foreign host application.
//! Modules are discovered by reading their manifests out of the module
//! image without executing it, registered as host commands, and driven
//! through the filter lifecycle against a host drawable when a command is
//! invoked.
//!
//! # Architecture
//!
//! - [`resource`] reads resources and exports from module images.
//! - [`manifest`] parses and validates the property-list manifest.
//! - [`registry`] turns manifests into host commands and caches them.
//! - [`module`] loads native modules and resolves their entry points.
//! - [`handle`] and [`suites`] provide the callbacks a module calls back
//!   into, with [`context`] publishing per-call state to them.
//! - [`filter`] is the Parameters, Prepare, Start, Continue and Finish
//!   state machine, including tile exchange with the [`host`] drawable.
//! - [`outcome`] and [`error`] translate module result codes into errors
//!   and host statuses.
//! - [`runner`] ties it together for the host's command dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use pspi_host::host::{MemoryImage, MemoryStateStore, PixelFormat};
//! use pspi_host::module::NativeLoader;
//! use pspi_host::registry::{FilterRegistry, discovery};
//! use pspi_host::{FilterRunner, HostStatus, RunMode};
//!
//! let registry = discovery::scan(&[PathBuf::from("/opt/plug-ins")], &FilterRegistry::new());
//! let mut runner = FilterRunner::new(registry, NativeLoader, MemoryStateStore::new());
//!
//! let mut image = MemoryImage::new(PixelFormat::Rgb, 1, 1, vec![0, 0, 0]).expect("image");
//! let result = runner.run_filter(
//!     "photoshop_plug_in_invert_doinvert",
//!     RunMode::NonInteractive,
//!     &mut image,
//! );
//! println!("{:?}", HostStatus::from_result(&result));
//! ```

pub mod abi;
pub mod context;
pub mod error;
pub mod filter;
pub mod handle;
pub mod host;
pub mod manifest;
pub mod module;
pub mod outcome;
pub mod registry;
pub mod resource;
pub mod runner;
pub mod suites;

#[cfg(test)]
mod tests;

pub use self::error::{Completion, HostStatus, PluginError};
pub use self::filter::{FilterSession, ModeLayout, Step};
pub use self::host::{Drawable, FilterHost, ImageHost, MemoryImage, PixelFormat, StateStore};
pub use self::manifest::{FilterManifest, ImageTypes};
pub use self::module::{EntryPoint, ModuleLoader, NativeLoader};
pub use self::registry::{CommandInstaller, FilterRegistry, RegistryEntry};
pub use self::runner::{FilterRunner, PathEditor, RunMode};
