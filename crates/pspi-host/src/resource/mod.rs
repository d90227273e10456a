//! Resource and export lookup in portable-executable module images.
//!
//! Filter modules carry their manifest as a typed, named resource. The
//! [`PeImage`] reader walks the resource directory tree of a module image
//! held in memory, so discovery never has to execute foreign code, and it
//! reads the export directory to confirm that claimed entry symbols exist.
//!
//! # Example
//!
//! ```no_run
//! use pspi_host::resource::{PeImage, ResourceId, Visit};
//!
//! # fn main() -> Result<(), pspi_host::PluginError> {
//! let image = PeImage::open("Invert.8bf")?;
//! let pipl = ResourceId::named("PIPL");
//! image.for_each_resource(|key| {
//!     if key.resource_type == pipl {
//!         println!("manifest {}", key.name);
//!     }
//!     Visit::Continue
//! })?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::PluginError;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const EXPORT_DIRECTORY: usize = 0;
const RESOURCE_DIRECTORY: usize = 2;
const HIGH_BIT: u32 = 0x8000_0000;
const SECTION_HEADER_LEN: usize = 40;
const DIRECTORY_HEADER_LEN: usize = 16;
const DIRECTORY_ENTRY_LEN: usize = 8;

/// Identifier of a resource type or name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    /// Identifier given as a string.
    Named(String),
    /// Identifier given as a small integer.
    Numeric(u16),
}

impl ResourceId {
    /// Builds a string identifier.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_owned())
    }

    /// Classifies an identifier passed in a pointer-sized slot.
    ///
    /// The loader APIs smuggle small integers through string-pointer
    /// parameters: values whose high-order bits are zero are integers, and
    /// anything else is dereferenced through `read_name`.
    pub fn from_raw(raw: usize, read_name: impl FnOnce(usize) -> String) -> Self {
        match u16::try_from(raw) {
            Ok(id) => Self::Numeric(id),
            Err(_) => Self::Named(read_name(raw)),
        }
    }

    fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Named(left), Self::Named(right)) => left.eq_ignore_ascii_case(right),
            (Self::Numeric(left), Self::Numeric(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Numeric(id) => write!(f, "#{id}"),
        }
    }
}

/// Full identity of one resource leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Resource type, such as `PIPL`.
    pub resource_type: ResourceId,
    /// Resource name.
    pub name: ResourceId,
    /// Language identifier.
    pub language: u16,
}

/// Visitor verdict during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep walking.
    Continue,
    /// Stop after this leaf.
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

#[derive(Debug, Clone, Copy)]
struct DataDirectory {
    rva: u32,
    size: u32,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryEntry {
    name: u32,
    target: u32,
}

/// A module image parsed far enough to read resources and exports.
#[derive(Debug, Clone)]
pub struct PeImage {
    bytes: Vec<u8>,
    sections: Vec<Section>,
    resources: Option<DataDirectory>,
    exports: Option<DataDirectory>,
}

impl PeImage {
    /// Reads and parses the module at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be read and
    /// [`PluginError::MalformedResource`] when it is not a module image.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path_ref = path.as_ref();
        let bytes = std::fs::read(path_ref).map_err(|source| PluginError::Io {
            path: path_ref.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::parse(bytes)
    }

    /// Parses a module image held in memory.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MalformedResource`] when the headers are
    /// missing or truncated.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, PluginError> {
        if bytes.get(..2) != Some(DOS_MAGIC.as_slice()) {
            return Err(malformed("missing DOS signature"));
        }
        let pe_offset = to_usize(read_u32(&bytes, 0x3c)?);
        if bytes.get(pe_offset..pe_offset + 4) != Some(PE_SIGNATURE.as_slice()) {
            return Err(malformed("missing PE signature"));
        }
        let coff = pe_offset + 4;
        let section_count = usize::from(read_u16(&bytes, coff + 2)?);
        let optional_len = usize::from(read_u16(&bytes, coff + 16)?);
        let optional = coff + 20;

        let (count_offset, directories) = match read_u16(&bytes, optional)? {
            PE32_MAGIC => (optional + 92, optional + 96),
            PE32_PLUS_MAGIC => (optional + 108, optional + 112),
            other => return Err(malformed(&format!("unknown optional header magic {other:#x}"))),
        };
        let directory_count = to_usize(read_u32(&bytes, count_offset)?);
        let directory = |index: usize| -> Result<Option<DataDirectory>, PluginError> {
            if index >= directory_count {
                return Ok(None);
            }
            let at = directories + index * 8;
            let rva = read_u32(&bytes, at)?;
            let size = read_u32(&bytes, at + 4)?;
            Ok((rva != 0 && size != 0).then_some(DataDirectory { rva, size }))
        };
        let exports = directory(EXPORT_DIRECTORY)?;
        let resources = directory(RESOURCE_DIRECTORY)?;

        let table = optional + optional_len;
        let sections = (0..section_count)
            .map(|index| {
                let at = table + index * SECTION_HEADER_LEN;
                Ok(Section {
                    virtual_size: read_u32(&bytes, at + 8)?,
                    virtual_address: read_u32(&bytes, at + 12)?,
                    raw_size: read_u32(&bytes, at + 16)?,
                    raw_offset: read_u32(&bytes, at + 20)?,
                })
            })
            .collect::<Result<Vec<_>, PluginError>>()?;

        debug!(
            sections = sections.len(),
            has_resources = resources.is_some(),
            has_exports = exports.is_some(),
            "parsed module image"
        );
        Ok(Self {
            bytes,
            sections,
            resources,
            exports,
        })
    }

    /// Visits every (type, name, language) leaf in the resource tree.
    ///
    /// Images without a resource section have nothing to visit.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MalformedResource`] when a directory points
    /// outside the image.
    pub fn for_each_resource(
        &self,
        mut visitor: impl FnMut(&ResourceKey) -> Visit,
    ) -> Result<(), PluginError> {
        let Some(base) = self.resource_base()? else {
            return Ok(());
        };
        for type_entry in self.directory_entries(base, 0)? {
            let resource_type = self.entry_id(base, type_entry)?;
            let names_at = subdirectory(type_entry)?;
            for name_entry in self.directory_entries(base, names_at)? {
                let name = self.entry_id(base, name_entry)?;
                let languages_at = subdirectory(name_entry)?;
                for language_entry in self.directory_entries(base, languages_at)? {
                    let key = ResourceKey {
                        resource_type: resource_type.clone(),
                        name: name.clone(),
                        language: u16::try_from(language_entry.name).unwrap_or(0),
                    };
                    if visitor(&key) == Visit::Stop {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the bytes of the resource identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ResourceNotFound`] when no leaf matches and
    /// [`PluginError::ResourceLockFailed`] when the leaf's data lies outside
    /// the image.
    pub fn find(&self, key: &ResourceKey) -> Result<&[u8], PluginError> {
        let not_found = || PluginError::ResourceNotFound {
            resource_type: key.resource_type.to_string(),
            name: key.name.to_string(),
        };
        let base = self.resource_base()?.ok_or_else(not_found)?;
        let type_entry = self
            .lookup(base, 0, |id| id.matches(&key.resource_type))?
            .ok_or_else(not_found)?;
        let name_entry = self
            .lookup(base, subdirectory(type_entry)?, |id| id.matches(&key.name))?
            .ok_or_else(not_found)?;
        let language_id = ResourceId::Numeric(key.language);
        let language_entry = self
            .lookup(base, subdirectory(name_entry)?, |id| id.matches(&language_id))?
            .ok_or_else(not_found)?;
        if language_entry.target & HIGH_BIT != 0 {
            return Err(malformed("resource leaf is a directory"));
        }
        let data_at = base + to_usize(language_entry.target);
        let rva = read_u32(&self.bytes, data_at)?;
        let size = to_usize(read_u32(&self.bytes, data_at + 4)?);
        let lock_failed = |message: &str| PluginError::ResourceLockFailed {
            name: key.name.to_string(),
            message: message.to_owned(),
        };
        let offset = self
            .rva_to_offset(rva)
            .ok_or_else(|| lock_failed("data is not mapped by any section"))?;
        self.bytes
            .get(offset..offset + size)
            .ok_or_else(|| lock_failed("data extends past the end of the image"))
    }

    /// Returns the names in the export directory.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MalformedResource`] when the export table is
    /// truncated.
    pub fn exported_names(&self) -> Result<Vec<String>, PluginError> {
        let Some(exports) = self.exports else {
            return Ok(Vec::new());
        };
        let table = self
            .rva_to_offset(exports.rva)
            .ok_or_else(|| malformed("export directory is not mapped"))?;
        let count = to_usize(read_u32(&self.bytes, table + 24)?);
        let names_rva = read_u32(&self.bytes, table + 32)?;
        let names = self
            .rva_to_offset(names_rva)
            .ok_or_else(|| malformed("export name table is not mapped"))?;
        (0..count)
            .map(|index| {
                let name_rva = read_u32(&self.bytes, names + index * 4)?;
                let at = self
                    .rva_to_offset(name_rva)
                    .ok_or_else(|| malformed("export name is not mapped"))?;
                read_c_string(&self.bytes, at)
            })
            .collect()
    }

    /// Returns `true` when `symbol` appears in the export directory.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`PeImage::exported_names`].
    pub fn exports_symbol(&self, symbol: &str) -> Result<bool, PluginError> {
        Ok(self.exported_names()?.iter().any(|name| name == symbol))
    }

    fn resource_base(&self) -> Result<Option<usize>, PluginError> {
        self.resources
            .map(|directory| {
                debug!(size = directory.size, "resource directory");
                self.rva_to_offset(directory.rva)
                    .ok_or_else(|| malformed("resource directory is not mapped"))
            })
            .transpose()
    }

    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|section| {
            let extent = section.virtual_size.max(section.raw_size);
            let delta = rva.checked_sub(section.virtual_address)?;
            (delta < extent && delta < section.raw_size)
                .then(|| to_usize(section.raw_offset) + to_usize(delta))
        })
    }

    fn directory_entries(
        &self,
        base: usize,
        directory: usize,
    ) -> Result<Vec<DirectoryEntry>, PluginError> {
        let at = base + directory;
        let named = usize::from(read_u16(&self.bytes, at + 12)?);
        let numbered = usize::from(read_u16(&self.bytes, at + 14)?);
        (0..named + numbered)
            .map(|index| {
                let entry = at + DIRECTORY_HEADER_LEN + index * DIRECTORY_ENTRY_LEN;
                Ok(DirectoryEntry {
                    name: read_u32(&self.bytes, entry)?,
                    target: read_u32(&self.bytes, entry + 4)?,
                })
            })
            .collect()
    }

    fn entry_id(&self, base: usize, entry: DirectoryEntry) -> Result<ResourceId, PluginError> {
        if entry.name & HIGH_BIT == 0 {
            return u16::try_from(entry.name)
                .map(ResourceId::Numeric)
                .map_err(|_| malformed("numeric resource identifier out of range"));
        }
        let at = base + to_usize(entry.name & !HIGH_BIT);
        let length = usize::from(read_u16(&self.bytes, at)?);
        let units = (0..length)
            .map(|index| read_u16(&self.bytes, at + 2 + index * 2))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResourceId::Named(String::from_utf16_lossy(&units)))
    }

    fn lookup(
        &self,
        base: usize,
        directory: usize,
        mut wanted: impl FnMut(&ResourceId) -> bool,
    ) -> Result<Option<DirectoryEntry>, PluginError> {
        for entry in self.directory_entries(base, directory)? {
            if wanted(&self.entry_id(base, entry)?) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

fn subdirectory(entry: DirectoryEntry) -> Result<usize, PluginError> {
    if entry.target & HIGH_BIT == 0 {
        return Err(malformed("expected a subdirectory"));
    }
    Ok(to_usize(entry.target & !HIGH_BIT))
}

fn malformed(message: &str) -> PluginError {
    PluginError::MalformedResource {
        message: message.to_owned(),
    }
}

fn to_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], PluginError> {
    at.checked_add(N)
        .and_then(|end| bytes.get(at..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| malformed(&format!("read of {N} bytes at {at:#x} is out of bounds")))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, PluginError> {
    read_array(bytes, at).map(u16::from_le_bytes)
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, PluginError> {
    read_array(bytes, at).map(u32::from_le_bytes)
}

fn read_c_string(bytes: &[u8], at: usize) -> Result<String, PluginError> {
    let tail = bytes
        .get(at..)
        .ok_or_else(|| malformed("string starts past the end of the image"))?;
    let end = tail
        .iter()
        .position(|byte| *byte == 0)
        .ok_or_else(|| malformed("unterminated string"))?;
    Ok(String::from_utf8_lossy(tail.get(..end).unwrap_or_default()).into_owned())
}
