//! Buffer suite.

use std::ffi::c_void;
use std::ptr;

use tracing::trace;

use super::{NO_CONTEXT, to_usize};
use crate::abi::{BUFFER_SPACE, BufferId, OsErr, codes};
use crate::context::with_active;

pub(super) unsafe extern "C" fn allocate(requested: i32, buffer: *mut BufferId) -> OsErr {
    if buffer.is_null() {
        return codes::NIL_HANDLE_ERR;
    }
    let Some(size) = to_usize(requested) else {
        return codes::MEM_FULL_ERR;
    };
    with_active(NO_CONTEXT, |context| {
        let id = context.buffers.allocate(size);
        trace!(size, ?id, "buffer allocated");
        // SAFETY: the module passes a writable slot for the identifier.
        unsafe { buffer.write_unaligned(id) };
        codes::NO_ERR
    })
}

pub(super) unsafe extern "C" fn lock(buffer: BufferId, _move_high: u8) -> *mut c_void {
    with_active(ptr::null_mut(), |context| {
        if context.buffers.contains(buffer) {
            buffer
        } else {
            trace!(?buffer, "lock of unknown buffer");
            ptr::null_mut()
        }
    })
}

pub(super) unsafe extern "C" fn unlock(_buffer: BufferId) {}

pub(super) unsafe extern "C" fn free(buffer: BufferId) {
    with_active((), |context| {
        if !context.buffers.free(buffer) {
            trace!(?buffer, "free of unknown buffer");
        }
    });
}

pub(super) unsafe extern "C" fn space() -> i32 {
    BUFFER_SPACE
}
