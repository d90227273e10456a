//! Discovery of filter modules on the search path.
//!
//! Every file with an `.8bf` suffix below a search directory is a
//! candidate. Its `PIPL` resources are parsed without loading the module,
//! and each entry whose symbol appears in the export table becomes a
//! [`RegistryEntry`]. Problems with one candidate are logged and never stop
//! the scan.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{FilterRegistry, ModuleRecord, RegistryEntry};
use crate::error::PluginError;
use crate::manifest::FilterManifest;
use crate::resource::{PeImage, ResourceId, ResourceKey, Visit};

/// File suffix of filter modules, compared case-insensitively.
pub const MODULE_EXTENSION: &str = "8bf";

const MANIFEST_TYPE: &str = "PIPL";

/// Scans `search_path` and returns the registry of modules found there.
///
/// Modules whose path and modification time match a record in `previous`
/// keep their cached entries without being read again. Modules that are no
/// longer present are dropped.
pub fn scan(search_path: &[PathBuf], previous: &FilterRegistry) -> FilterRegistry {
    let mut registry = FilterRegistry::new();
    let mut queried = 0_usize;
    for path in candidates(search_path) {
        let modified = match fs::metadata(&path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(error) => {
                warn!(path = %path.display(), %error, "cannot stat module");
                continue;
            }
        };
        if let Some(cached) = previous
            .module(&path)
            .filter(|record| record.is_current(modified))
        {
            debug!(path = %path.display(), "module unchanged");
            registry.insert(cached.clone());
            continue;
        }
        queried += 1;
        let entries = query_module(&path).unwrap_or_else(|error| {
            warn!(path = %path.display(), %error, "skipping module");
            Vec::new()
        });
        registry.insert(ModuleRecord::new(path, modified, entries));
    }
    let dropped = previous
        .modules()
        .filter(|record| registry.module(record.path()).is_none())
        .count();
    info!(
        modules = registry.len(),
        queried,
        dropped,
        "plug-in scan finished"
    );
    registry
}

/// Reads the entries declared by the module at `path`.
///
/// # Errors
///
/// Returns [`PluginError::Io`] or [`PluginError::MalformedResource`] when
/// the file is not a readable module image. Problems with single manifests
/// are logged and the manifest is skipped.
pub fn query_module(path: &Path) -> Result<Vec<RegistryEntry>, PluginError> {
    let image = PeImage::open(path)?;
    query_image(path, &image)
}

/// Reads the entries declared by an already parsed module image.
///
/// # Errors
///
/// Returns [`PluginError::MalformedResource`] when the resource tree is
/// corrupt.
pub fn query_image(path: &Path, image: &PeImage) -> Result<Vec<RegistryEntry>, PluginError> {
    let mut keys = Vec::new();
    image.for_each_resource(|key| {
        if is_manifest(key) {
            keys.push(key.clone());
        }
        Visit::Continue
    })?;

    let mut entries: Vec<RegistryEntry> = Vec::new();
    for key in keys {
        match entry_for(path, image, &key) {
            Ok(entry) if entries.iter().any(|known| known.command() == entry.command()) => {
                debug!(command = entry.command(), "duplicate entry ignored");
            }
            Ok(entry) => {
                debug!(
                    command = entry.command(),
                    menu = %entry.manifest().menu_path(),
                    types = %entry.image_types(),
                    "entry found"
                );
                entries.push(entry);
            }
            Err(error) => {
                warn!(path = %path.display(), resource = %key.name, %error, "skipping manifest");
            }
        }
    }
    Ok(entries)
}

fn entry_for(path: &Path, image: &PeImage, key: &ResourceKey) -> Result<RegistryEntry, PluginError> {
    let manifest = FilterManifest::parse(image.find(key)?)?;
    if !image.exports_symbol(manifest.entry_symbol())? {
        return Err(PluginError::EntrySymbolUnresolvable {
            path: path.to_path_buf(),
            symbol: manifest.entry_symbol().to_owned(),
        });
    }
    Ok(RegistryEntry::new(path, manifest))
}

fn is_manifest(key: &ResourceKey) -> bool {
    matches!(&key.resource_type, ResourceId::Named(name) if name.eq_ignore_ascii_case(MANIFEST_TYPE))
}

/// Returns `true` for paths with the module suffix.
#[must_use]
pub fn is_module_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(MODULE_EXTENSION))
}

fn candidates(search_path: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for directory in search_path {
        walk(directory, &mut found);
    }
    found
}

fn walk(directory: &Path, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(directory = %directory.display(), %error, "cannot read search directory");
            return;
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            walk(&path, found);
        } else if is_module_path(&path) {
            found.push(path);
        }
    }
}
