//! PiPL manifest parsing.
//!
//! A filter module describes each of its entry points in a "plug-in property
//! list" resource: a short header followed by tagged, variable-length
//! property records. [`FilterManifest::parse`] walks those records and
//! validates them against what this host can run. Symbol resolution is left
//! to discovery, which has the module image at hand.
//!
//! # Example
//!
//! ```no_run
//! use pspi_host::FilterManifest;
//!
//! # fn demo(bytes: &[u8]) -> Result<(), pspi_host::PluginError> {
//! let manifest = FilterManifest::parse(bytes)?;
//! println!("{} -> {}", manifest.menu_path(), manifest.entry_symbol());
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::abi::{FourCc, ImageMode, LATEST_FILTER_SUB_VERSION, LATEST_FILTER_VERSION, tags};
use crate::error::{ManifestField, PluginError};

const HEADER_LEN: usize = 10;
const PROPERTY_HEADER_LEN: usize = 16;
const ELLIPSIS: &str = "...";

/// One tagged record of a property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    /// Vendor that defined the property.
    pub vendor: FourCc,
    /// Property tag.
    pub key: FourCc,
    /// Property instance identifier.
    pub id: i32,
    /// Payload without alignment padding.
    pub data: &'a [u8],
}

/// Splits a property list resource into its records.
///
/// The resource starts with a 16-bit signature, a 32-bit format version that
/// must be zero and a 32-bit record count. Each record's payload is padded
/// to a four-byte boundary; the padding is skipped, not returned.
///
/// # Errors
///
/// Returns [`PluginError::UnsupportedManifestVersion`] for a non-zero
/// format version and [`PluginError::MalformedManifest`] when the stream is
/// shorter than its header claims.
pub fn parse_properties(bytes: &[u8]) -> Result<Vec<Property<'_>>, PluginError> {
    let version = read_i32(bytes, 2)?;
    if version != 0 {
        return Err(PluginError::UnsupportedManifestVersion { version });
    }
    let count = usize::try_from(read_i32(bytes, 6)?)
        .map_err(|_| malformed("negative property count"))?;

    let mut properties = Vec::with_capacity(count.min(64));
    let mut offset = HEADER_LEN;
    for _ in 0..count {
        let length = usize::try_from(read_i32(bytes, offset + 12)?)
            .map_err(|_| malformed("negative property length"))?;
        let start = offset + PROPERTY_HEADER_LEN;
        let data = start
            .checked_add(length)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| malformed("property payload extends past the resource"))?;
        let property = Property {
            vendor: FourCc::from_raw(read_u32(bytes, offset)?),
            key: FourCc::from_raw(read_u32(bytes, offset + 4)?),
            id: read_i32(bytes, offset + 8)?,
            data,
        };
        trace!(key = %property.key, length, "manifest property");
        properties.push(property);
        offset = start + length.next_multiple_of(4);
    }
    Ok(properties)
}

/// Filter interface version declared by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl InterfaceVersion {
    /// Newest version this host implements.
    pub const LATEST: Self = Self {
        major: LATEST_FILTER_VERSION,
        minor: LATEST_FILTER_SUB_VERSION,
    };

    /// Unpacks a version stored with the major number in the high word.
    #[must_use]
    pub const fn from_packed(packed: u32) -> Self {
        let [high, next, low, last] = packed.to_be_bytes();
        Self {
            major: u16::from_be_bytes([high, next]),
            minor: u16::from_be_bytes([low, last]),
        }
    }

    /// Returns `true` when this host understands the version.
    #[must_use]
    pub fn is_supported(self) -> bool {
        self <= Self::LATEST
    }
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Host drawable types a filter can be applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTypes {
    /// Grayscale drawables, with or without alpha.
    pub gray: bool,
    /// RGB drawables, with or without alpha.
    pub rgb: bool,
}

impl ImageTypes {
    /// Types assumed when a manifest declares no modes.
    pub const RGB_ONLY: Self = Self {
        gray: false,
        rgb: true,
    };

    /// Translates a manifest mode mask into host types.
    ///
    /// Only grayscale and RGB have host equivalents; every other mode bit is
    /// ignored.
    #[must_use]
    pub const fn from_mode_mask(mask: u16) -> Self {
        Self {
            gray: mask & ImageMode::GrayScale.mask_bit() != 0,
            rgb: mask & ImageMode::RgbColor.mask_bit() != 0,
        }
    }

    /// Returns `true` when no host type is supported.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.gray && !self.rgb
    }
}

impl fmt::Display for ImageTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.gray, self.rgb) {
            (true, true) => f.write_str("GRAY* RGB*"),
            (true, false) => f.write_str("GRAY*"),
            (false, true) => f.write_str("RGB*"),
            (false, false) => Ok(()),
        }
    }
}

/// Validated description of one filter entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterManifest {
    entry_symbol: String,
    category: String,
    name: String,
    image_types: ImageTypes,
    version: Option<InterfaceVersion>,
}

impl FilterManifest {
    /// Parses and validates one property list resource.
    ///
    /// # Errors
    ///
    /// Returns the manifest-validation variants of [`PluginError`]:
    /// [`NotAFilterPlugin`](PluginError::NotAFilterPlugin),
    /// [`UnsupportedManifestVersion`](PluginError::UnsupportedManifestVersion),
    /// [`UnsupportedInterfaceVersion`](PluginError::UnsupportedInterfaceVersion),
    /// [`NoCompatibleModes`](PluginError::NoCompatibleModes),
    /// [`MissingRequiredField`](PluginError::MissingRequiredField) or
    /// [`MalformedManifest`](PluginError::MalformedManifest).
    pub fn parse(bytes: &[u8]) -> Result<Self, PluginError> {
        let mut symbols = EntrySymbols::default();
        let mut declared_category = None;
        let mut declared_name = None;
        let mut image_types = None;
        let mut version = None;

        for property in parse_properties(bytes)? {
            match property.key {
                tags::KIND => {
                    if property.data.get(..4) != Some(tags::FILTER_KIND_PAYLOAD.as_slice()) {
                        return Err(PluginError::NotAFilterPlugin {
                            kind: String::from_utf8_lossy(property.data).into_owned(),
                        });
                    }
                }
                tags::CODE_WIN64_X86 => symbols.win64 = Some(c_string(property.data)),
                tags::CODE_WIN32_X86 => symbols.win32 = Some(c_string(property.data)),
                tags::VERSION => {
                    let declared = InterfaceVersion::from_packed(read_u32(property.data, 0)?);
                    if !declared.is_supported() {
                        return Err(PluginError::UnsupportedInterfaceVersion {
                            major: declared.major,
                            minor: declared.minor,
                        });
                    }
                    version = Some(declared);
                }
                tags::IMAGE_MODES => {
                    let mask = read_array::<2>(property.data, 0).map(u16::from_be_bytes)?;
                    let translated = ImageTypes::from_mode_mask(mask);
                    if translated.is_empty() {
                        debug!(mask, "entry supports no host image mode");
                        return Err(PluginError::NoCompatibleModes);
                    }
                    image_types = Some(translated);
                }
                tags::CATEGORY => declared_category = Some(clean(&pascal_string(property.data))),
                tags::NAME => declared_name = Some(clean(&pascal_string(property.data))),
                other => trace!(key = %other, "ignoring manifest property"),
            }
        }

        let entry_symbol = symbols
            .preferred()
            .filter(|symbol| !symbol.is_empty())
            .ok_or(PluginError::MissingRequiredField {
                field: ManifestField::EntrySymbol,
            })?;
        let category = required(declared_category, ManifestField::Category)?;
        let name = required(declared_name, ManifestField::Name)?;

        Ok(Self {
            entry_symbol,
            category,
            name,
            image_types: image_types.unwrap_or(ImageTypes::RGB_ONLY),
            version,
        })
    }

    /// Exported symbol implementing the filter.
    #[must_use]
    pub fn entry_symbol(&self) -> &str {
        &self.entry_symbol
    }

    /// Cleaned menu category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Cleaned menu name, including any trailing ellipsis.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Menu name without a trailing ellipsis.
    #[must_use]
    pub fn menu_label(&self) -> &str {
        self.name.strip_suffix(ELLIPSIS).unwrap_or(&self.name)
    }

    /// `category/label` path relative to the host's menu prefixes.
    #[must_use]
    pub fn menu_path(&self) -> String {
        format!("{}/{}", self.category, self.menu_label())
    }

    /// Host drawable types the filter accepts.
    #[must_use]
    pub const fn image_types(&self) -> ImageTypes {
        self.image_types
    }

    /// Declared interface version, if any.
    #[must_use]
    pub const fn version(&self) -> Option<InterfaceVersion> {
        self.version
    }
}

#[derive(Debug, Default)]
struct EntrySymbols {
    win32: Option<String>,
    win64: Option<String>,
}

impl EntrySymbols {
    #[cfg(target_pointer_width = "64")]
    fn preferred(self) -> Option<String> {
        self.win64.or(self.win32)
    }

    #[cfg(not(target_pointer_width = "64"))]
    fn preferred(self) -> Option<String> {
        self.win32.or(self.win64)
    }
}

fn required(value: Option<String>, field: ManifestField) -> Result<String, PluginError> {
    value
        .filter(|text| !text.is_empty())
        .ok_or(PluginError::MissingRequiredField { field })
}

/// Strips surrounding spaces and replaces `/`, which would split the menu
/// path, with `:`.
fn clean(text: &str) -> String {
    text.trim_matches(' ').replace('/', ":")
}

fn c_string(data: &[u8]) -> String {
    let end = data.iter().position(|byte| *byte == 0).unwrap_or(data.len());
    String::from_utf8_lossy(data.get(..end).unwrap_or(data)).into_owned()
}

fn pascal_string(data: &[u8]) -> String {
    crate::outcome::pascal_string(data).unwrap_or_default()
}

fn malformed(message: &str) -> PluginError {
    PluginError::MalformedManifest {
        message: message.to_owned(),
    }
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], PluginError> {
    at.checked_add(N)
        .and_then(|end| bytes.get(at..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| malformed(&format!("manifest truncated at offset {at}")))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, PluginError> {
    read_array(bytes, at).map(u32::from_le_bytes)
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32, PluginError> {
    read_array(bytes, at).map(i32::from_le_bytes)
}
