//! Handle suite, a thin adapter over the context's
//! [`HandleArena`](crate::handle::HandleArena).

use std::ffi::c_void;
use std::ptr;

use tracing::trace;

use super::{NO_CONTEXT, to_i32, to_usize};
use crate::abi::{Handle, OsErr, codes};
use crate::context::with_active;
use crate::handle::HandleError;

pub(super) unsafe extern "C" fn new(requested: i32) -> Handle {
    let Some(size) = to_usize(requested) else {
        return ptr::null_mut();
    };
    with_active(ptr::null_mut(), |context| {
        let handle = context.handles.allocate(size);
        trace!(size, ?handle, "handle allocated");
        handle
    })
}

pub(super) unsafe extern "C" fn dispose(handle: Handle) {
    with_active((), |context| context.handles.dispose(handle));
}

pub(super) unsafe extern "C" fn dispose_regular(handle: Handle) {
    with_active((), |context| context.handles.dispose_regular(handle));
}

pub(super) unsafe extern "C" fn get_size(handle: Handle) -> i32 {
    with_active(0, |context| to_i32(context.handles.size(handle)))
}

pub(super) unsafe extern "C" fn set_size(handle: Handle, requested: i32) -> OsErr {
    let Some(size) = to_usize(requested) else {
        return codes::MEM_FULL_ERR;
    };
    with_active(NO_CONTEXT, |context| match context.handles.set_size(handle, size) {
        Ok(()) => codes::NO_ERR,
        Err(HandleError::Invalid { .. }) => codes::NIL_HANDLE_ERR,
        Err(HandleError::Resize { .. }) => codes::MEM_FULL_ERR,
    })
}

pub(super) unsafe extern "C" fn lock(handle: Handle, _move_high: u8) -> *mut c_void {
    with_active(ptr::null_mut(), |context| context.handles.lock(handle).cast())
}

pub(super) unsafe extern "C" fn unlock(handle: Handle) {
    with_active((), |context| context.handles.unlock(handle));
}

pub(super) unsafe extern "C" fn recover_space(size: i32) {
    with_active((), |context| {
        context.handles.recover_space(to_usize(size).unwrap_or(0));
    });
}
