//! Basic extension suite.
//!
//! No optional suites are offered. The block allocator and token
//! comparison work.

use std::ffi::{CStr, c_char, c_void};

use tracing::trace;

use crate::abi::{OsErr, codes};
use crate::context::with_active;

const NO_ERROR: i32 = 0;

fn status(code: OsErr) -> i32 {
    i32::from(code)
}

fn name_of(name: *const c_char) -> String {
    if name.is_null() {
        return String::new();
    }
    // SAFETY: suite names are NUL-terminated strings owned by the module.
    unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
}

pub(super) unsafe extern "C" fn acquire_suite(
    name: *const c_char,
    version: i32,
    suite: *mut *const c_void,
) -> i32 {
    trace!(name = %name_of(name), version, "suite acquisition refused");
    if !suite.is_null() {
        // SAFETY: the module passes a writable slot for the suite pointer.
        unsafe { suite.write_unaligned(std::ptr::null()) };
    }
    status(codes::ERR_PLUG_IN_HOST_INSUFFICIENT)
}

pub(super) unsafe extern "C" fn release_suite(name: *const c_char, version: i32) -> i32 {
    trace!(name = %name_of(name), version, "suite released");
    NO_ERROR
}

pub(super) unsafe extern "C" fn is_equal(token1: *const c_char, token2: *const c_char) -> u8 {
    if token1.is_null() || token2.is_null() {
        return u8::from(token1 == token2);
    }
    // SAFETY: both tokens are NUL-terminated strings owned by the module.
    let first = unsafe { CStr::from_ptr(token1) };
    // SAFETY: as above.
    let second = unsafe { CStr::from_ptr(token2) };
    u8::from(first == second)
}

pub(super) unsafe extern "C" fn allocate_block(size: usize, block: *mut *mut c_void) -> i32 {
    if block.is_null() {
        return status(codes::MEM_FULL_ERR);
    }
    with_active(status(codes::ERR_PLUG_IN_HOST_INSUFFICIENT), |context| {
        let address = context.blocks.allocate(size);
        trace!(size, ?address, "block allocated");
        // SAFETY: the module passes a writable slot for the block.
        unsafe { block.write_unaligned(address) };
        NO_ERROR
    })
}

pub(super) unsafe extern "C" fn free_block(block: *mut c_void) -> i32 {
    with_active(status(codes::ERR_PLUG_IN_HOST_INSUFFICIENT), |context| {
        if !context.blocks.free(block) {
            trace!(?block, "free of unknown block");
        }
        NO_ERROR
    })
}

pub(super) unsafe extern "C" fn reallocate_block(
    block: *mut c_void,
    size: usize,
    new_block: *mut *mut c_void,
) -> i32 {
    if new_block.is_null() {
        return status(codes::MEM_FULL_ERR);
    }
    with_active(status(codes::ERR_PLUG_IN_HOST_INSUFFICIENT), |context| {
        let Some(address) = context.blocks.reallocate(block, size) else {
            trace!(?block, "reallocation of unknown block");
            return status(codes::MEM_FULL_ERR);
        };
        // SAFETY: the module passes a writable slot for the new block.
        unsafe { new_block.write_unaligned(address) };
        NO_ERROR
    })
}

pub(super) unsafe extern "C" fn undefined() -> i32 {
    NO_ERROR
}
