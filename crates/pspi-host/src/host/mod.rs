//! Services the emulation layer consumes from the hosting application.
//!
//! The filter state machine never touches pixels or image metadata
//! directly. It reads from and writes to a [`Drawable`], and asks an
//! [`ImageHost`] for everything else a plugin may query: resolution,
//! channel and path names, palette colours and attached metadata.
//! [`MemoryImage`] implements both over plain byte buffers.

mod memory;
mod store;

use std::fmt;

pub use self::memory::MemoryImage;
pub use self::store::{
    JsonStateStore, MemoryStateStore, PersistedState, SavedParameters, StateStore,
};

/// Pixel layout of a host drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Three interleaved colour bytes.
    Rgb,
    /// Colour plus alpha.
    Rgba,
    /// One gray byte.
    Gray,
    /// Gray plus alpha.
    GrayA,
    /// Palette index.
    Indexed,
    /// Palette index plus alpha.
    IndexedA,
}

impl PixelFormat {
    /// Bytes per interleaved pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray | Self::Indexed => 1,
            Self::GrayA | Self::IndexedA => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Returns `true` when the last byte of each pixel is alpha.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba | Self::GrayA | Self::IndexedA)
    }

    /// Host type string used when registering commands.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
            Self::Gray => "GRAY",
            Self::GrayA => "GRAYA",
            Self::Indexed => "INDEXED",
            Self::IndexedA => "INDEXEDA",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An axis-aligned region of a drawable in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Creates a rectangle from its origin and extent.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the right-most column.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom row.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Returns `true` when the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel storage a filter reads from and writes to.
///
/// Reads always see the original pixels. Writes go to a shadow copy that
/// [`commit`](Drawable::commit) merges once the filter has finished, so a
/// filter never observes its own output as input.
pub trait Drawable {
    /// Layout of each pixel.
    fn pixel_format(&self) -> PixelFormat;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Bounding box of the current selection, or the whole drawable.
    fn mask_bounds(&self) -> PixelRect;

    /// Returns `true` for a floating selection.
    fn is_floating(&self) -> bool {
        false
    }

    /// Copies `rect` into `out` as interleaved rows without padding.
    ///
    /// `rect` lies within the drawable and `out` holds exactly
    /// `width * height * bytes_per_pixel` bytes.
    fn read_rect(&self, rect: PixelRect, out: &mut [u8]);

    /// Like [`read_rect`](Drawable::read_rect) but sees pending writes.
    fn read_shadow_rect(&self, rect: PixelRect, out: &mut [u8]);

    /// Stores interleaved rows into the shadow copy.
    fn write_rect(&mut self, rect: PixelRect, data: &[u8]);

    /// Merges the shadow copy into the drawable.
    fn commit(&mut self);

    /// Throws away pending writes.
    fn discard(&mut self);
}

/// Image-level services beyond pixel access.
pub trait ImageHost {
    /// Horizontal and vertical resolution in dots per inch.
    fn resolution(&self) -> (f64, f64);

    /// Size of the whole image, which may exceed the drawable.
    fn image_size(&self) -> (u32, u32);

    /// Names of the image's channels in stacking order.
    fn channel_names(&self) -> Vec<String>;

    /// Names of the image's paths.
    fn path_names(&self) -> Vec<String>;

    /// Current background colour.
    fn background(&self) -> [u8; 3];

    /// Current foreground colour.
    fn foreground(&self) -> [u8; 3];

    /// Preferred tile width and height.
    fn tile_size(&self) -> (u16, u16);

    /// Returns the metadata attached under `key`.
    fn find_metadata(&self, key: &str) -> Option<Vec<u8>>;

    /// Attaches or replaces metadata under `key`.
    fn attach_metadata(&mut self, key: &str, bytes: &[u8]);

    /// Removes the metadata under `key`, if any.
    fn detach_metadata(&mut self, key: &str);

    /// Reports filter progress as a fraction between zero and one.
    fn progress(&mut self, fraction: f64);
}

/// Everything a filter run needs from the host.
pub trait FilterHost: Drawable + ImageHost {}

impl<T: Drawable + ImageHost> FilterHost for T {}
