//! Unit tests for the callback suites.
//!
//! Callbacks only see state while an entry point runs, so most tests drive
//! them from inside a [`During`] entry point.

use std::cell::RefCell;
use std::ffi::{CString, c_void};
use std::ptr;

use rstest::rstest;

use super::*;
use crate::abi::{BufferId, FourCc, Handle, PixelMap, Selector, VRect, tags};
use crate::context::InvocationContext;
use crate::handle::HandleArena;
use crate::host::{MemoryImage, PixelFormat};
use crate::module::EntryPoint;

/// Runs a closure once, while its call is active.
struct During<F>(RefCell<Option<F>>);

impl<F: FnOnce()> EntryPoint for During<F> {
    unsafe fn invoke(&self, _selector: Selector, _record: *mut c_void, _data: *mut isize) -> OsErr {
        if let Some(body) = self.0.borrow_mut().take() {
            body();
        }
        codes::NO_ERR
    }
}

fn within(host: &mut MemoryImage, body: impl FnOnce()) {
    let mut context = InvocationContext::new(host, HandleArena::new());
    let entry = During(RefCell::new(Some(body)));
    assert_eq!(context.call(&entry, Selector::Prepare), codes::NO_ERR);
}

fn image() -> MemoryImage {
    MemoryImage::new(PixelFormat::Rgb, 2, 2, vec![0; 12])
        .expect("image")
        .with_channels(vec!["Red".to_owned(), "Green".to_owned(), "Blue".to_owned()])
        .with_paths(vec!["Outline".to_owned()])
}

/// Allocates a handle holding `bytes` through the handle suite.
fn handle_with(bytes: &[u8]) -> Handle {
    let size = i32::try_from(bytes.len()).expect("small handle");
    // SAFETY: called inside an active entry-point call.
    unsafe {
        let handle = handles::new(size);
        let data = handles::lock(handle, 0).cast::<u8>();
        ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
        handles::unlock(handle);
        handle
    }
}

/// Reads a handle's bytes through the handle suite.
fn bytes_of(handle: Handle) -> Vec<u8> {
    // SAFETY: called inside an active entry-point call with a live handle.
    unsafe {
        let size = usize::try_from(handles::get_size(handle)).expect("size");
        let data = handles::lock(handle, 0).cast::<u8>();
        let bytes = std::slice::from_raw_parts(data, size).to_vec();
        handles::unlock(handle);
        bytes
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[test]
fn tables_are_built_once() {
    assert!(ptr::eq(tables(), tables()));
    let handle = tables().handle;
    let (version, count) = (handle.version, handle.count);
    assert_eq!((version, count), (HANDLE_PROCS_VERSION, HANDLE_PROCS_COUNT));
}

#[test]
fn records_point_at_the_shared_tables() {
    let mut record = FilterRecord::zeroed();
    install_record(&mut record, tables());
    let (handle_procs, sp_basic) = (record.handle_procs, record.sp_basic);
    assert_eq!(handle_procs, &raw const tables().handle);
    assert_eq!(sp_basic, &raw const tables().basic);
    let (abort_proc, advance_state) = (record.abort_proc, record.advance_state);
    assert!(abort_proc.is_some());
    assert!(advance_state.is_some());
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[test]
fn handle_callbacks_outside_a_call_degrade() {
    // SAFETY: every callback tolerates being called without a context.
    unsafe {
        assert!(handles::new(8).is_null());
        assert_eq!(handles::get_size(ptr::null_mut()), 0);
        assert_eq!(handles::set_size(ptr::null_mut(), 4), NO_CONTEXT);
    }
}

#[test]
fn handles_resize_in_place() {
    let mut host = image();
    within(&mut host, || {
        let handle = handle_with(b"abcd");
        // SAFETY: called inside an active entry-point call.
        let resized = unsafe { handles::set_size(handle, 6) };
        assert_eq!(resized, codes::NO_ERR);
        assert_eq!(bytes_of(handle), b"abcd\0\0");
        // SAFETY: as above.
        unsafe { handles::dispose(handle) };
        // SAFETY: as above.
        assert_eq!(unsafe { handles::get_size(handle) }, 0);
    });
}

#[rstest]
#[case::negative(-1, codes::MEM_FULL_ERR)]
#[case::garbage(4, codes::NIL_HANDLE_ERR)]
fn bad_resizes_are_rejected(#[case] size: i32, #[case] expected: OsErr) {
    let mut host = image();
    let mut garbage = 0_u64;
    let handle: Handle = ptr::from_mut(&mut garbage).cast();
    within(&mut host, || {
        // SAFETY: the arena classifies the value before touching it.
        assert_eq!(unsafe { handles::set_size(handle, size) }, expected);
    });
}

// ---------------------------------------------------------------------------
// Buffers and blocks
// ---------------------------------------------------------------------------

#[test]
fn buffers_lock_to_their_own_address() {
    let mut host = image();
    within(&mut host, || {
        let mut id: BufferId = ptr::null_mut();
        // SAFETY: called inside an active entry-point call.
        unsafe {
            assert_eq!(buffer::allocate(16, &raw mut id), codes::NO_ERR);
            assert_eq!(buffer::lock(id, 0), id);
            buffer::free(id);
            assert!(buffer::lock(id, 0).is_null());
            assert_eq!(buffer::space(), crate::abi::BUFFER_SPACE);
        }
    });
}

#[test]
fn buffer_allocation_needs_a_slot() {
    // SAFETY: a null slot is rejected before anything is written.
    assert_eq!(unsafe { buffer::allocate(4, ptr::null_mut()) }, codes::NIL_HANDLE_ERR);
}

#[test]
fn block_pool_reallocates_and_frees() {
    let mut pool = BlockPool::default();
    let block = pool.allocate(0);
    assert_eq!(pool.size(block), Some(1));
    let grown = pool.reallocate(block, 32).expect("known block");
    assert_eq!(pool.size(grown), Some(32));
    assert_eq!(pool.len(), 1);
    assert!(pool.free(grown));
    assert!(!pool.free(grown));
    assert!(pool.is_empty());
    let mut foreign = 0_u8;
    assert!(pool.reallocate(ptr::from_mut(&mut foreign).cast(), 4).is_none());
}

#[test]
fn basic_suite_allocates_blocks() {
    let mut host = image();
    within(&mut host, || {
        let mut block: *mut c_void = ptr::null_mut();
        let mut moved: *mut c_void = ptr::null_mut();
        // SAFETY: called inside an active entry-point call.
        unsafe {
            assert_eq!(basic::allocate_block(8, &raw mut block), 0);
            assert!(!block.is_null());
            assert_eq!(basic::reallocate_block(block, 64, &raw mut moved), 0);
            assert!(!moved.is_null());
            assert_eq!(basic::free_block(moved), 0);
        }
    });
}

#[rstest]
#[case::same("PSTest", "PSTest", 1)]
#[case::different("PSTest", "PSTset", 0)]
#[case::prefix("PS", "PSTest", 0)]
fn tokens_compare_as_strings(#[case] first: &str, #[case] second: &str, #[case] expected: u8) {
    let first_token = CString::new(first).expect("token");
    let second_token = CString::new(second).expect("token");
    // SAFETY: both tokens are NUL-terminated and outlive the call.
    let equal = unsafe { basic::is_equal(first_token.as_ptr(), second_token.as_ptr()) };
    assert_eq!(equal, expected);
}

#[test]
fn suite_acquisition_is_refused() {
    let name = CString::new("Photoshop Channel Ports SUITE").expect("name");
    let mut suite: *const c_void = ptr::dangling();
    // SAFETY: the name is NUL-terminated and the slot is writable.
    let status = unsafe { basic::acquire_suite(name.as_ptr(), 1, &raw mut suite) };
    assert_eq!(status, i32::from(codes::ERR_PLUG_IN_HOST_INSUFFICIENT));
    assert!(suite.is_null());
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

const HISTORY: FourCc = FourCc::from_bytes(*b"hist");

#[test]
fn resources_are_dense_and_shift_on_delete() {
    let mut host = image();
    within(&mut host, || {
        // SAFETY: called inside an active entry-point call.
        unsafe {
            for bytes in [b"first".as_slice(), b"second".as_slice(), b"third".as_slice()] {
                assert_eq!(resources::add(HISTORY, handle_with(bytes)), codes::NO_ERR);
            }
            assert_eq!(resources::count(HISTORY), 3);
            resources::delete(HISTORY, 0);
            assert_eq!(resources::count(HISTORY), 2);
            assert_eq!(bytes_of(resources::get(HISTORY, 0)), b"second");
            assert_eq!(bytes_of(resources::get(HISTORY, 1)), b"third");
            assert!(resources::get(HISTORY, 2).is_null());
            resources::delete(HISTORY, 5);
            assert_eq!(resources::count(HISTORY), 2);
        }
    });
    assert_eq!(
        host.metadata_keys(),
        [resources::resource_key(HISTORY, 0), resources::resource_key(HISTORY, 1)]
    );
}

#[test]
fn empty_handles_are_stored_as_empty_resources() {
    let mut host = image();
    within(&mut host, || {
        // SAFETY: called inside an active entry-point call.
        unsafe {
            assert_eq!(resources::add(HISTORY, handle_with(b"")), codes::NO_ERR);
            assert_eq!(resources::count(HISTORY), 1);
            let stored = resources::get(HISTORY, 0);
            assert!(!stored.is_null());
            assert_eq!(handles::get_size(stored), 0);
        }
    });
    assert_eq!(host.metadata_keys(), [resources::resource_key(HISTORY, 0)]);
}

#[test]
fn adding_a_null_handle_fails() {
    let mut host = image();
    within(&mut host, || {
        // SAFETY: called inside an active entry-point call.
        let code = unsafe { resources::add(HISTORY, ptr::null_mut()) };
        assert_eq!(code, codes::NIL_HANDLE_ERR);
    });
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[rstest]
#[case::channels(tags::PROP_NUMBER_OF_CHANNELS, 0, 3)]
#[case::paths(tags::PROP_NUMBER_OF_PATHS, 0, 1)]
fn simple_properties_report_counts(#[case] key: FourCc, #[case] index: i32, #[case] expected: i32) {
    let mut host = image();
    within(&mut host, || {
        let mut value = -1;
        // SAFETY: called inside an active entry-point call.
        let code = unsafe {
            properties::get(tags::PHOTOSHOP_SIGNATURE, key, index, &raw mut value, ptr::null_mut())
        };
        assert_eq!(code, codes::NO_ERR);
        assert_eq!(value, expected);
    });
}

#[rstest]
#[case::channel_name(tags::PROP_CHANNEL_NAME, 1, Ok(b"Green".as_slice()))]
#[case::path_name(tags::PROP_PATH_NAME, 0, Ok(b"Outline".as_slice()))]
#[case::past_the_end(tags::PROP_CHANNEL_NAME, 3, Err(codes::ERR_PLUG_IN_PROPERTY_UNDEFINED))]
#[case::unknown_key(FourCc::from_bytes(*b"zzzz"), 0, Err(codes::ERR_PLUG_IN_HOST_INSUFFICIENT))]
fn complex_properties_return_handles(
    #[case] key: FourCc,
    #[case] index: i32,
    #[case] expected: Result<&[u8], OsErr>,
) {
    let mut host = image();
    within(&mut host, || {
        let mut handle: Handle = ptr::null_mut();
        // SAFETY: called inside an active entry-point call.
        let code = unsafe {
            properties::get(tags::PHOTOSHOP_SIGNATURE, key, index, ptr::null_mut(), &raw mut handle)
        };
        match expected {
            Ok(bytes) => {
                assert_eq!(code, codes::NO_ERR);
                assert_eq!(bytes_of(handle), bytes);
            }
            Err(error) => {
                assert_eq!(code, error);
                assert!(handle.is_null());
            }
        }
    });
}

#[test]
fn foreign_signatures_are_refused() {
    let mut value = 0;
    // SAFETY: the signature check precedes any context access.
    let code = unsafe {
        properties::get(
            FourCc::from_bytes(*b"ABCD"),
            tags::PROP_IMAGE_MODE,
            0,
            &raw mut value,
            ptr::null_mut(),
        )
    };
    assert_eq!(code, codes::ERR_PLUG_IN_HOST_INSUFFICIENT);
}

#[rstest]
#[case::known(tags::PROP_IMAGE_MODE, codes::NO_ERR)]
#[case::unknown(FourCc::from_bytes(*b"zzzz"), codes::ERR_PLUG_IN_HOST_INSUFFICIENT)]
fn property_writes_are_accepted_only_for_known_keys(#[case] key: FourCc, #[case] expected: OsErr) {
    // SAFETY: writes never touch the handle.
    let code = unsafe { properties::set(tags::PHOTOSHOP_SIGNATURE, key, 0, 7, ptr::null_mut()) };
    assert_eq!(code, expected);
}

// ---------------------------------------------------------------------------
// Single callbacks
// ---------------------------------------------------------------------------

#[test]
fn progress_reaches_the_host_clamped() {
    let mut host = image();
    within(&mut host, || {
        // SAFETY: called inside an active entry-point call.
        unsafe {
            misc::update_progress(1, 4);
            misc::update_progress(9, 4);
            misc::update_progress(1, 0);
        }
    });
    assert_eq!(host.progress_reports(), [0.25, 1.0]);
}

fn pixel_map(base: *mut c_void, row_bytes: i32) -> PixelMap {
    PixelMap {
        version: 1,
        bounds: VRect {
            top: 0,
            left: 0,
            bottom: 1,
            right: 1,
        },
        image_mode: 3,
        row_bytes,
        col_bytes: 3,
        plane_bytes: 1,
        base_addr: base,
    }
}

#[rstest]
#[case::valid(4, true, true, codes::NO_ERR)]
#[case::no_context(4, true, false, codes::FILTER_BAD_PARAMETERS)]
#[case::zero_stride(0, true, true, codes::FILTER_BAD_PARAMETERS)]
#[case::no_pixels(4, false, true, codes::FILTER_BAD_PARAMETERS)]
fn display_requests_are_validated(
    #[case] row_bytes: i32,
    #[case] with_pixels: bool,
    #[case] with_platform: bool,
    #[case] expected: OsErr,
) {
    let mut pixels = [0_u8; 4];
    let base = if with_pixels {
        pixels.as_mut_ptr().cast()
    } else {
        ptr::null_mut()
    };
    let map = pixel_map(base, row_bytes);
    let mut platform = 0_u8;
    let platform_context: *mut c_void = if with_platform {
        ptr::from_mut(&mut platform).cast()
    } else {
        ptr::null_mut()
    };
    // SAFETY: every pointer is either null or valid for the call.
    let code = unsafe { misc::display_pixels(&raw const map, ptr::null(), 0, 0, platform_context) };
    assert_eq!(code, expected);
}

#[test]
fn services_are_unavailable() {
    // SAFETY: neither service touches its arguments.
    unsafe {
        assert_eq!(
            services::interpolate(
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                0
            ),
            codes::MEM_FULL_ERR
        );
        assert_eq!(
            services::color_services(ptr::null_mut()),
            codes::ERR_PLUG_IN_HOST_INSUFFICIENT
        );
        assert_eq!(misc::test_abort(), 0);
    }
}
