//! An image held entirely in memory.

use std::collections::BTreeMap;

use crate::error::PluginError;

use super::{Drawable, ImageHost, PixelFormat, PixelRect};

const DEFAULT_TILE: u16 = 64;
const DEFAULT_RESOLUTION: f64 = 72.0;

/// A single-drawable image backed by byte buffers.
///
/// # Example
///
/// ```
/// use pspi_host::host::{Drawable, MemoryImage, PixelFormat};
///
/// let image = MemoryImage::new(PixelFormat::Gray, 2, 1, vec![10, 20]).expect("image");
/// assert_eq!(image.width(), 2);
/// assert_eq!(image.pixels(), &[10, 20]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryImage {
    format: PixelFormat,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    shadow: Vec<u8>,
    selection: Option<PixelRect>,
    floating: bool,
    resolution: (f64, f64),
    channels: Vec<String>,
    paths: Vec<String>,
    background: [u8; 3],
    foreground: [u8; 3],
    tile: (u16, u16),
    metadata: BTreeMap<String, Vec<u8>>,
    progress: Vec<f64>,
}

impl MemoryImage {
    /// Wraps interleaved pixels.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Calling`] when `pixels` does not hold exactly
    /// `width * height` pixels of `format`.
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, PluginError> {
        let expected = pixel_count(width, height) * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(PluginError::Calling {
                message: format!(
                    "{width}x{height} {format} image needs {expected} bytes, got {}",
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            format,
            width,
            height,
            shadow: pixels.clone(),
            pixels,
            selection: None,
            floating: false,
            resolution: (DEFAULT_RESOLUTION, DEFAULT_RESOLUTION),
            channels: Vec::new(),
            paths: Vec::new(),
            background: [255, 255, 255],
            foreground: [0, 0, 0],
            tile: (DEFAULT_TILE, DEFAULT_TILE),
            metadata: BTreeMap::new(),
            progress: Vec::new(),
        })
    }

    /// Restricts filtering to `rect`.
    #[must_use]
    pub const fn with_selection(mut self, rect: PixelRect) -> Self {
        self.selection = Some(rect);
        self
    }

    /// Sets the resolution in dots per inch.
    #[must_use]
    pub const fn with_resolution(mut self, horizontal: f64, vertical: f64) -> Self {
        self.resolution = (horizontal, vertical);
        self
    }

    /// Sets the channel names.
    #[must_use]
    pub fn with_channels(mut self, names: Vec<String>) -> Self {
        self.channels = names;
        self
    }

    /// Sets the path names.
    #[must_use]
    pub fn with_paths(mut self, names: Vec<String>) -> Self {
        self.paths = names;
        self
    }

    /// Sets the palette colours.
    #[must_use]
    pub const fn with_colors(mut self, foreground: [u8; 3], background: [u8; 3]) -> Self {
        self.foreground = foreground;
        self.background = background;
        self
    }

    /// Sets the preferred tile size.
    #[must_use]
    pub const fn with_tile_size(mut self, width: u16, height: u16) -> Self {
        self.tile = (width, height);
        self
    }

    /// Marks the drawable as a floating selection.
    #[must_use]
    pub const fn floating(mut self) -> Self {
        self.floating = true;
        self
    }

    /// Committed pixels.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consumes the image and returns its committed pixels.
    #[must_use]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Progress fractions reported so far.
    #[must_use]
    pub fn progress_reports(&self) -> &[f64] {
        &self.progress
    }

    /// Keys of all attached metadata in sorted order.
    #[must_use]
    pub fn metadata_keys(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    fn copy_out(&self, source: &[u8], rect: PixelRect, out: &mut [u8]) {
        let row_len = to_usize(rect.width) * self.format.bytes_per_pixel();
        for (row, target) in (0..rect.height).zip(out.chunks_exact_mut(row_len.max(1))) {
            let (start, end) = self.row_span(rect, row);
            if let Some(pixels) = source.get(start..end) {
                target.copy_from_slice(pixels);
            }
        }
    }

    fn row_span(&self, rect: PixelRect, row: u32) -> (usize, usize) {
        let bpp = self.format.bytes_per_pixel();
        let start = (to_usize(rect.y + row) * to_usize(self.width) + to_usize(rect.x)) * bpp;
        (start, start + to_usize(rect.width) * bpp)
    }
}

impl Drawable for MemoryImage {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn mask_bounds(&self) -> PixelRect {
        self.selection
            .unwrap_or_else(|| PixelRect::new(0, 0, self.width, self.height))
    }

    fn is_floating(&self) -> bool {
        self.floating
    }

    fn read_rect(&self, rect: PixelRect, out: &mut [u8]) {
        self.copy_out(&self.pixels, rect, out);
    }

    fn read_shadow_rect(&self, rect: PixelRect, out: &mut [u8]) {
        self.copy_out(&self.shadow, rect, out);
    }

    fn write_rect(&mut self, rect: PixelRect, data: &[u8]) {
        let row_len = to_usize(rect.width) * self.format.bytes_per_pixel();
        for (row, source) in (0..rect.height).zip(data.chunks_exact(row_len.max(1))) {
            let (start, end) = self.row_span(rect, row);
            if let Some(target) = self.shadow.get_mut(start..end) {
                target.copy_from_slice(source);
            }
        }
    }

    fn commit(&mut self) {
        let bounds = self.mask_bounds();
        for row in 0..bounds.height {
            let (start, end) = self.row_span(bounds, row);
            if let (Some(target), Some(source)) =
                (self.pixels.get_mut(start..end), self.shadow.get(start..end))
            {
                target.copy_from_slice(source);
            }
        }
        self.shadow.clone_from(&self.pixels);
    }

    fn discard(&mut self) {
        self.shadow.clone_from(&self.pixels);
    }
}

impl ImageHost for MemoryImage {
    fn resolution(&self) -> (f64, f64) {
        self.resolution
    }

    fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn channel_names(&self) -> Vec<String> {
        self.channels.clone()
    }

    fn path_names(&self) -> Vec<String> {
        self.paths.clone()
    }

    fn background(&self) -> [u8; 3] {
        self.background
    }

    fn foreground(&self) -> [u8; 3] {
        self.foreground
    }

    fn tile_size(&self) -> (u16, u16) {
        self.tile
    }

    fn find_metadata(&self, key: &str) -> Option<Vec<u8>> {
        self.metadata.get(key).cloned()
    }

    fn attach_metadata(&mut self, key: &str, bytes: &[u8]) {
        self.metadata.insert(key.to_owned(), bytes.to_vec());
    }

    fn detach_metadata(&mut self, key: &str) {
        self.metadata.remove(key);
    }

    fn progress(&mut self, fraction: f64) {
        self.progress.push(fraction);
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    to_usize(width) * to_usize(height)
}

fn to_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
