//! Single callbacks stored directly in the filter record.

use std::ffi::c_void;

use tracing::trace;

use super::NO_CONTEXT;
use crate::abi::{OsErr, PixelMap, VRect, codes};
use crate::context::with_active;

pub(super) unsafe extern "C" fn test_abort() -> u8 {
    0
}

pub(super) unsafe extern "C" fn update_progress(done: i32, total: i32) {
    if total <= 0 {
        return;
    }
    let fraction = progress_fraction(done, total);
    with_active((), |context| {
        if let Some(host) = context.host() {
            host.progress(fraction);
        }
    });
}

/// Share of the work completed, clamped to `0.0..=1.0`.
#[expect(clippy::float_arithmetic, reason = "progress is reported to the host as a fraction")]
fn progress_fraction(done: i32, total: i32) -> f64 {
    (f64::from(done) / f64::from(total)).clamp(0.0, 1.0)
}

pub(super) unsafe extern "C" fn host_proc(selector: i16, _data: *mut isize) {
    trace!(selector, "host procedure ignored");
}

pub(super) unsafe extern "C" fn process_event(_event: *mut c_void) {}

pub(super) unsafe extern "C" fn display_pixels(
    source: *const PixelMap,
    _source_rect: *const VRect,
    destination_row: i32,
    destination_column: i32,
    platform_context: *mut c_void,
) -> OsErr {
    if platform_context.is_null() || source.is_null() {
        return codes::FILTER_BAD_PARAMETERS;
    }
    // SAFETY: `source` is non-null and points at the module's pixel map.
    let map = unsafe { source.read_unaligned() };
    let base = map.base_addr;
    if map.row_bytes == 0 || base.is_null() {
        return codes::FILTER_BAD_PARAMETERS;
    }
    trace!(destination_row, destination_column, "display request ignored");
    codes::NO_ERR
}

pub(super) unsafe extern "C" fn advance_state() -> OsErr {
    with_active(NO_CONTEXT, |context| context.advance())
}
