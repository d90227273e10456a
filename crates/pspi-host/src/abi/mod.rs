//! Binary contract shared with compiled filter modules.
//!
//! Everything in this module mirrors the legacy filter plug-in headers: the
//! numeric selector and error codes, the four-character tags used by
//! manifests and callback suites, the small geometry value types and the
//! fixed-layout records in [`record`]. Field order, widths and packing are
//! part of the wire contract and must not be "tidied".

use std::ffi::c_void;
use std::fmt;

pub mod record;

pub use self::record::{
    AboutRecord, BufferProcs, FilterEntryFn, FilterRecord, HandleProcs, ImageServicesProcs, PixelMap,
    PlatformData, PropertyProcs, ResourceProcs, SpBasicSuite,
};

/// Opaque relocatable memory reference handed across the plugin boundary.
pub type Handle = *mut c_void;

/// Opaque buffer reference returned by the buffer suite.
pub type BufferId = *mut c_void;

/// Legacy 16-bit status code.
pub type OsErr = i16;

/// 16.16 fixed point number.
pub type Fixed = i32;

/// Pascal string with a leading length byte.
pub type Str255 = [u8; 256];

/// Highest filter interface major version this host understands.
pub const LATEST_FILTER_VERSION: u16 = 4;

/// Highest filter interface minor version this host understands.
pub const LATEST_FILTER_SUB_VERSION: u16 = 0;

/// Value reported by the buffer suite's space query and `maxSpace`.
pub const BUFFER_SPACE: i32 = 100_000_000;

/// Converts an integer to 16.16 fixed point.
#[must_use]
pub const fn long_to_fixed(value: i32) -> Fixed {
    value << 16
}

/// Converts a 16.16 fixed point number to its integer part.
#[must_use]
pub const fn fixed_to_long(value: Fixed) -> i32 {
    value >> 16
}

/// Numeric result codes understood by filter modules.
pub mod codes {
    use super::OsErr;

    /// Success.
    pub const NO_ERR: OsErr = 0;
    /// File read error.
    pub const READ_ERR: OsErr = -19;
    /// File write error.
    pub const WRIT_ERR: OsErr = -20;
    /// File open error.
    pub const OPEN_ERR: OsErr = -23;
    /// Disk full.
    pub const DSK_FUL_ERR: OsErr = -34;
    /// Generic I/O error.
    pub const IO_ERR: OsErr = -36;
    /// Out of memory.
    pub const MEM_FULL_ERR: OsErr = -108;
    /// Operation on a null handle.
    pub const NIL_HANDLE_ERR: OsErr = -109;
    /// The user dismissed a dialog.
    pub const USER_CANCELED_ERR: OsErr = -128;
    /// Nonstandard cancel code returned by many modules.
    pub const LEGACY_CANCEL: OsErr = 1;
    /// The filter rejected its parameters.
    pub const FILTER_BAD_PARAMETERS: OsErr = -30100;
    /// The filter does not support the image mode.
    pub const FILTER_BAD_MODE: OsErr = -30101;
    /// A required host capability is missing.
    pub const ERR_PLUG_IN_HOST_INSUFFICIENT: OsErr = -30900;
    /// A requested property is undefined.
    pub const ERR_PLUG_IN_PROPERTY_UNDEFINED: OsErr = -30901;
    /// The host only supports a column step of one.
    pub const ERR_HOST_DOES_NOT_SUPPORT_COL_STEP: OsErr = -30902;
    /// An invalid sample point was requested.
    pub const ERR_INVALID_SAMPLE_POINT: OsErr = -30903;
    /// The module placed a message in `errorString`.
    pub const ERR_REPORT_STRING: OsErr = -30904;
}

/// Lifecycle phase requested from a filter entry point.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Show the module's about box.
    About = 0,
    /// Query parameters, usually through a dialog.
    Parameters = 1,
    /// Negotiate memory and geometry.
    Prepare = 2,
    /// Begin processing and request the first tiles.
    Start = 3,
    /// Process the supplied tiles and request more.
    Continue = 4,
    /// Release per-run resources.
    Finish = 5,
}

impl Selector {
    /// Returns the numeric selector passed to the entry point.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Returns the phase name used in diagnostics.
    #[must_use]
    pub const fn phase_name(self) -> &'static str {
        match self {
            Self::About => "filterSelectorAbout",
            Self::Parameters => "filterSelectorParameters",
            Self::Prepare => "filterSelectorPrepare",
            Self::Start => "filterSelectorStart",
            Self::Continue => "filterSelectorContinue",
            Self::Finish => "filterSelectorFinish",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase_name())
    }
}

/// Image modes declared by the filter interface.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMode {
    /// One bit per pixel.
    Bitmap = 0,
    /// Eight-bit grayscale.
    GrayScale = 1,
    /// Palette based.
    IndexedColor = 2,
    /// Eight-bit RGB.
    RgbColor = 3,
    /// Eight-bit CMYK.
    CmykColor = 4,
    /// HSL.
    HslColor = 5,
    /// HSB.
    HsbColor = 6,
    /// Arbitrary channels.
    Multichannel = 7,
    /// Duotone.
    Duotone = 8,
    /// CIE Lab.
    LabColor = 9,
    /// Sixteen-bit grayscale.
    Gray16 = 10,
    /// Sixteen-bit RGB.
    Rgb48 = 11,
    /// Sixteen-bit Lab.
    Lab48 = 12,
    /// Sixteen-bit CMYK.
    Cmyk64 = 13,
    /// Sixteen-bit multichannel.
    DeepMultichannel = 14,
    /// Sixteen-bit duotone.
    Duotone16 = 15,
}

impl ImageMode {
    /// Every mode in declaration order, indexed by its numeric value.
    pub const ALL: [Self; 16] = [
        Self::Bitmap,
        Self::GrayScale,
        Self::IndexedColor,
        Self::RgbColor,
        Self::CmykColor,
        Self::HslColor,
        Self::HsbColor,
        Self::Multichannel,
        Self::Duotone,
        Self::LabColor,
        Self::Gray16,
        Self::Rgb48,
        Self::Lab48,
        Self::Cmyk64,
        Self::DeepMultichannel,
        Self::Duotone16,
    ];

    /// Returns the numeric mode stored in `imageMode`.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }

    /// Returns the bit this mode occupies in a manifest mode mask.
    #[must_use]
    pub const fn mask_bit(self) -> u16 {
        0x8000 >> self.code()
    }
}

/// Four-character code stored as a multi-character constant.
///
/// The value matches the compiler's interpretation of `'kind'`, so the
/// first character occupies the most significant byte.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(u32);

impl FourCc {
    /// Builds a code from its four characters.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Wraps a raw multi-character value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw multi-character value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the characters in reading order.
    #[must_use]
    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        if bytes.iter().all(|byte| byte.is_ascii_graphic() || *byte == b' ') {
            bytes
                .iter()
                .try_for_each(|byte| write!(f, "{}", char::from(*byte)))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// Tags used by manifests, properties and host identification.
pub mod tags {
    use super::FourCc;

    /// Manifest property naming the plugin kind.
    pub const KIND: FourCc = FourCc::from_bytes(*b"kind");
    /// Manifest property carrying the interface version.
    pub const VERSION: FourCc = FourCc::from_bytes(*b"vers");
    /// Manifest property carrying supported image modes.
    pub const IMAGE_MODES: FourCc = FourCc::from_bytes(*b"mode");
    /// Manifest property naming the menu category.
    pub const CATEGORY: FourCc = FourCc::from_bytes(*b"catg");
    /// Manifest property naming the menu item.
    pub const NAME: FourCc = FourCc::from_bytes(*b"name");
    /// Manifest property naming the 32-bit x86 entry symbol.
    pub const CODE_WIN32_X86: FourCc = FourCc::from_bytes(*b"wx86");
    /// Manifest property naming the 64-bit x86 entry symbol.
    pub const CODE_WIN64_X86: FourCc = FourCc::from_bytes(*b"8664");
    /// Payload of the kind property for filter modules.
    pub const FILTER_KIND_PAYLOAD: [u8; 4] = *b"MFB8";

    /// Signature accepted by the property suite.
    pub const PHOTOSHOP_SIGNATURE: FourCc = FourCc::from_bytes(*b"8BIM");
    /// Number of channels in the image.
    pub const PROP_NUMBER_OF_CHANNELS: FourCc = FourCc::from_bytes(*b"nuch");
    /// Name of one channel.
    pub const PROP_CHANNEL_NAME: FourCc = FourCc::from_bytes(*b"nmch");
    /// Current image mode.
    pub const PROP_IMAGE_MODE: FourCc = FourCc::from_bytes(*b"mode");
    /// Number of paths in the image.
    pub const PROP_NUMBER_OF_PATHS: FourCc = FourCc::from_bytes(*b"nupa");
    /// Name of one path.
    pub const PROP_PATH_NAME: FourCc = FourCc::from_bytes(*b"nmpa");

    /// Signature reported in `hostSig`.
    pub const HOST_SIGNATURE: [u8; 4] = *b"GIMP";
}

/// Rectangle in image coordinates, half-open on the bottom and right.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// First row.
    pub top: i16,
    /// First column.
    pub left: i16,
    /// Row past the last.
    pub bottom: i16,
    /// Column past the last.
    pub right: i16,
}

impl Rect {
    /// Builds a rectangle from its edges.
    #[must_use]
    pub const fn new(top: i16, left: i16, bottom: i16, right: i16) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Returns `true` when the rectangle requests no data.
    ///
    /// A rectangle with `left == right` or `top == bottom` is "no request",
    /// never a zero-area request.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// Width in pixels, zero when empty.
    #[must_use]
    pub fn width(&self) -> usize {
        span(self.left, self.right)
    }

    /// Height in pixels, zero when empty.
    #[must_use]
    pub fn height(&self) -> usize {
        span(self.top, self.bottom)
    }
}

/// Distance from `start` to `end`, zero when `end` does not lie past `start`.
fn span(start: i16, end: i16) -> usize {
    usize::try_from(i32::from(end) - i32::from(start)).unwrap_or(0)
}

/// Point with vertical coordinate first.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    /// Vertical coordinate.
    pub v: i16,
    /// Horizontal coordinate.
    pub h: i16,
}

/// Sixteen-bit per channel colour.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbColor {
    /// Red component.
    pub red: u16,
    /// Green component.
    pub green: u16,
    /// Blue component.
    pub blue: u16,
}

impl RgbColor {
    /// Scales an eight-bit colour to the sixteen-bit range.
    #[must_use]
    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        // 0xFF * 0x101 == 0xFFFF, so the scale is exact.
        let widen = |component: u8| u16::from(component) * 0x101;
        let [red, green, blue] = rgb;
        Self {
            red: widen(red),
            green: widen(green),
            blue: widen(blue),
        }
    }
}

/// Rectangle with 32-bit edges used by pixel maps.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VRect {
    /// First row.
    pub top: i32,
    /// First column.
    pub left: i32,
    /// Row past the last.
    pub bottom: i32,
    /// Column past the last.
    pub right: i32,
}
