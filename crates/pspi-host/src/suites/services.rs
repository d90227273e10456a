//! Image and colour services, neither of which this host provides.

use std::ffi::c_void;

use tracing::trace;

use crate::abi::{Fixed, OsErr, Rect, codes};

pub(super) unsafe extern "C" fn interpolate(
    _source: *mut c_void,
    _destination: *mut c_void,
    _area: *mut Rect,
    _coords: *mut Fixed,
    method: i16,
) -> OsErr {
    trace!(method, "interpolation requested");
    codes::MEM_FULL_ERR
}

pub(super) unsafe extern "C" fn color_services(_info: *mut c_void) -> OsErr {
    trace!("colour services requested");
    codes::ERR_PLUG_IN_HOST_INSUFFICIENT
}
