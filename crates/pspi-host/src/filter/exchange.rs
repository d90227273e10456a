//! Tile exchange between the host's interleaved pixels and the module's
//! planar request buffers.
//!
//! Each advance stores the output the module produced for its previous
//! request, then fills buffers for the rectangles and plane ranges it asks
//! for next. Request buffers hold `planes` bytes per pixel with rows of
//! `planes * width` bytes. Parts of a request outside the drawable read as
//! zero and are discarded on store.

use std::ptr;

use tracing::{debug, trace};

use crate::abi::{FilterRecord, OsErr, Rect, codes};
use crate::host::{FilterHost, PixelRect};

/// A contiguous run of planes requested by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Planes {
    first: usize,
    count: usize,
}

impl Planes {
    fn new(lo: i16, hi: i16) -> Option<Self> {
        let first = usize::try_from(lo).ok()?;
        let last = usize::try_from(hi).ok()?;
        (last >= first).then_some(Self {
            first,
            count: last - first + 1,
        })
    }
}

/// The in-bounds part of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clip {
    region: PixelRect,
    skip_columns: usize,
    skip_rows: usize,
}

impl Clip {
    fn new(rect: Rect, width: u32, height: u32) -> Option<Self> {
        let left = i32::from(rect.left);
        let top = i32::from(rect.top);
        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = i32::from(rect.right).min(clamp_i32(width));
        let y1 = i32::from(rect.bottom).min(clamp_i32(height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Self {
            region: PixelRect::new(
                u32::try_from(x0).ok()?,
                u32::try_from(y0).ok()?,
                u32::try_from(x1 - x0).ok()?,
                u32::try_from(y1 - y0).ok()?,
            ),
            skip_columns: usize::try_from(x0 - left).ok()?,
            skip_rows: usize::try_from(y0 - top).ok()?,
        })
    }

    fn width(&self) -> usize {
        to_usize(self.region.width)
    }

    fn height(&self) -> usize {
        to_usize(self.region.height)
    }
}

/// Which host pixels fill a request buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Original,
    Shadow,
}

/// Output the module is writing, stored on the next advance.
#[derive(Debug)]
struct PendingOutput {
    buffer: Vec<u8>,
    rect: Rect,
    planes: Planes,
}

/// Buffers currently lent to the module.
#[derive(Debug, Default)]
pub struct TileExchange {
    input: Option<Vec<u8>>,
    output: Option<PendingOutput>,
}

impl TileExchange {
    /// Stores pending output and services the record's current requests.
    ///
    /// Returns `filterBadParameters` when a non-empty request names an
    /// inverted plane range.
    pub fn advance(&mut self, record: &mut FilterRecord, host: &mut dyn FilterHost) -> OsErr {
        self.input = None;
        record.in_data = ptr::null_mut();
        if let Some(pending) = self.output.take() {
            store(&pending, host);
        }
        record.out_data = ptr::null_mut();

        let in_rect = record.in_rect;
        if !in_rect.is_empty() {
            let Some(planes) = Planes::new(record.in_lo_plane, record.in_hi_plane) else {
                return codes::FILTER_BAD_PARAMETERS;
            };
            let mut buffer = fill(host, in_rect, planes, Source::Original);
            record.in_data = buffer.as_mut_ptr().cast();
            record.in_row_bytes = row_bytes(in_rect, planes);
            trace!(?in_rect, ?planes, "input tile ready");
            self.input = Some(buffer);
        }

        let out_rect = record.out_rect;
        if !out_rect.is_empty() {
            let Some(planes) = Planes::new(record.out_lo_plane, record.out_hi_plane) else {
                return codes::FILTER_BAD_PARAMETERS;
            };
            let mut buffer = fill(host, out_rect, planes, Source::Shadow);
            record.out_data = buffer.as_mut_ptr().cast();
            record.out_row_bytes = row_bytes(out_rect, planes);
            trace!(?out_rect, ?planes, "output tile ready");
            self.output = Some(PendingOutput {
                buffer,
                rect: out_rect,
                planes,
            });
        }
        record.mask_data = ptr::null_mut();
        codes::NO_ERR
    }

    /// Drops every lent buffer without storing output.
    pub fn release(&mut self, record: &mut FilterRecord) {
        if self.output.is_some() {
            debug!("discarding pending output");
        }
        self.input = None;
        self.output = None;
        record.in_data = ptr::null_mut();
        record.out_data = ptr::null_mut();
    }

    /// Returns `true` while output awaits storing.
    #[must_use]
    pub const fn has_pending_output(&self) -> bool {
        self.output.is_some()
    }
}

fn fill(host: &dyn FilterHost, rect: Rect, planes: Planes, source: Source) -> Vec<u8> {
    let stride = planes.count * rect.width();
    let mut buffer = vec![0; stride * rect.height()];
    let Some(clip) = Clip::new(rect, host.width(), host.height()) else {
        return buffer;
    };
    let bpp = host.pixel_format().bytes_per_pixel();
    let mut pixels = vec![0; clip.width() * clip.height() * bpp];
    match source {
        Source::Original => host.read_rect(clip.region, &mut pixels),
        Source::Shadow => host.read_shadow_rect(clip.region, &mut pixels),
    }
    let rows = buffer.chunks_exact_mut(stride).skip(clip.skip_rows);
    for (row, source_row) in rows.zip(pixels.chunks_exact(clip.width() * bpp)) {
        let Some(target) = row.get_mut(clip.skip_columns * planes.count..) else {
            continue;
        };
        for (sample, pixel) in target
            .chunks_exact_mut(planes.count)
            .zip(source_row.chunks_exact(bpp))
        {
            for (offset, byte) in sample.iter_mut().enumerate() {
                if let Some(value) = pixel.get(planes.first + offset) {
                    *byte = *value;
                }
            }
        }
    }
    buffer
}

fn store(pending: &PendingOutput, host: &mut dyn FilterHost) {
    let Some(clip) = Clip::new(pending.rect, host.width(), host.height()) else {
        return;
    };
    let planes = pending.planes;
    let stride = planes.count * pending.rect.width();
    let bpp = host.pixel_format().bytes_per_pixel();
    let mut pixels = vec![0; clip.width() * clip.height() * bpp];
    host.read_shadow_rect(clip.region, &mut pixels);
    let rows = pending.buffer.chunks_exact(stride).skip(clip.skip_rows);
    for (row, target) in rows.zip(pixels.chunks_exact_mut(clip.width() * bpp)) {
        let Some(source_row) = row.get(clip.skip_columns * planes.count..) else {
            continue;
        };
        for (sample, pixel) in source_row
            .chunks_exact(planes.count)
            .zip(target.chunks_exact_mut(bpp))
        {
            for (offset, value) in sample.iter().enumerate() {
                if let Some(byte) = pixel.get_mut(planes.first + offset) {
                    *byte = *value;
                }
            }
        }
    }
    host.write_rect(clip.region, &pixels);
    trace!(rect = ?pending.rect, "output tile stored");
}

fn row_bytes(rect: Rect, planes: Planes) -> i32 {
    i32::try_from(planes.count * rect.width()).unwrap_or(i32::MAX)
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
