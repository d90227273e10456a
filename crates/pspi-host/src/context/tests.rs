//! Unit tests for the invocation context and the active slot.

use std::cell::Cell;

use rstest::rstest;

use super::*;
use crate::abi::Selector;
use crate::host::{MemoryImage, PixelFormat};

/// Records whether a context was published while it ran.
struct Observer {
    saw_context: Cell<bool>,
    data_seen: Cell<isize>,
}

impl Observer {
    const fn new() -> Self {
        Self {
            saw_context: Cell::new(false),
            data_seen: Cell::new(0),
        }
    }
}

impl EntryPoint for Observer {
    unsafe fn invoke(&self, _selector: Selector, _record: *mut c_void, data: *mut isize) -> OsErr {
        self.saw_context.set(is_active());
        // SAFETY: the data token outlives the call.
        let token = unsafe { &mut *data };
        self.data_seen.set(*token);
        *token += 1;
        with_active(codes::ERR_PLUG_IN_HOST_INSUFFICIENT, |context| {
            i16::try_from(context.handles().len()).unwrap_or(i16::MAX)
        })
    }
}

/// Writes the data token through its pointer and through the active
/// context within one call.
struct TokenWriter;

impl EntryPoint for TokenWriter {
    unsafe fn invoke(&self, _selector: Selector, _record: *mut c_void, data: *mut isize) -> OsErr {
        // SAFETY: the data token outlives the call.
        unsafe { *data = 40 };
        let seen = with_active(0, |context| {
            let token = context.data();
            context.set_data(token + 1);
            token
        });
        // SAFETY: the data token outlives the call.
        unsafe { *data += 1 };
        i16::try_from(seen).unwrap_or(i16::MAX)
    }
}

fn image() -> MemoryImage {
    MemoryImage::new(PixelFormat::Rgb, 4, 4, vec![0; 48])
        .expect("image")
        .with_colors([1, 2, 3], [250, 251, 252])
        .with_tile_size(64, 32)
}

#[test]
fn callbacks_outside_a_call_get_the_fallback() {
    assert!(!is_active());
    assert_eq!(with_active(-1, |_| 0), -1);
}

#[test]
fn calls_publish_the_context_and_clear_it_afterwards() {
    let mut host = image();
    let mut context = InvocationContext::new(&mut host, HandleArena::new());
    context.set_data(7);
    let observer = Observer::new();

    let result = context.call(&observer, Selector::Prepare);

    assert_eq!(result, codes::NO_ERR);
    assert!(observer.saw_context.get());
    assert_eq!(observer.data_seen.get(), 7);
    assert_eq!(context.data(), 8);
    assert!(!is_active());
}

#[rstest]
#[case::filter(false)]
#[case::about(true)]
fn token_writes_through_pointer_and_context_agree(#[case] about: bool) {
    let mut context = InvocationContext::detached(HandleArena::new());
    let result = if about {
        context.call_about(&TokenWriter)
    } else {
        context.call(&TokenWriter, Selector::Parameters)
    };

    assert_eq!(result, 40);
    assert_eq!(context.data(), 42);
    assert!(!is_active());
}

#[test]
fn data_token_holds_pointer_sized_values() {
    let mut context = InvocationContext::detached(HandleArena::new());
    let address = ptr::from_ref(&context).addr().cast_signed();
    context.set_data(address);
    let observer = Observer::new();

    assert_eq!(context.call(&observer, Selector::Start), 0);

    assert_eq!(observer.data_seen.get(), address);
    assert_eq!(context.data(), address.wrapping_add(1));
}

#[test]
fn nested_activation_restores_the_outer_context() {
    let mut outer = InvocationContext::detached(HandleArena::new());
    let mut inner = InvocationContext::detached(HandleArena::new());
    let outer_address = ptr::from_mut(&mut outer).cast::<c_void>();
    {
        let _outer = ActiveContext::enter(ptr::from_mut(&mut outer));
        {
            let _inner = ActiveContext::enter(ptr::from_mut(&mut inner));
            assert_ne!(ACTIVE.with(Cell::get), outer_address);
        }
        assert_eq!(ACTIVE.with(Cell::get), outer_address);
    }
    assert!(!is_active());
}

#[test]
fn filter_records_carry_host_colours_and_tiles() {
    let mut host = image();
    let context = InvocationContext::new(&mut host, HandleArena::new());
    let record = context.record();
    let (back_color, fore_color) = (record.back_color, record.fore_color);
    let host_sig = record.host_sig;
    let (tile_width, tile_height) = (record.out_tile_width, record.out_tile_height);

    assert_eq!(back_color, [250, 251, 252, 0xFF]);
    assert_eq!(fore_color, [1, 2, 3, 0xFF]);
    assert_eq!(host_sig, u32::from_be_bytes(tags::HOST_SIGNATURE));
    assert_eq!((tile_width, tile_height), (64, 32));
}

#[rstest]
#[case::filter(true)]
#[case::about(false)]
fn records_point_at_the_callback_tables(#[case] with_host: bool) {
    let mut host = image();
    let context = if with_host {
        InvocationContext::new(&mut host, HandleArena::new())
    } else {
        InvocationContext::detached(HandleArena::new())
    };
    let record = context.record();
    let (handle_procs, error_string) = (record.handle_procs, record.error_string);
    assert!(!handle_procs.is_null());
    assert!(!error_string.is_null());
}

#[test]
fn about_records_share_the_basic_suite() {
    let mut context = InvocationContext::detached(HandleArena::new());
    let about = &raw const suites::tables().basic;
    let sp_basic = context.about.sp_basic;
    assert_eq!(sp_basic, about);
    let observer = Observer::new();
    assert_eq!(context.call_about(&observer), codes::NO_ERR);
}

#[test]
fn detached_contexts_cannot_exchange_tiles() {
    let mut context = InvocationContext::detached(HandleArena::new());
    assert_eq!(context.advance(), codes::ERR_PLUG_IN_HOST_INSUFFICIENT);
}

#[test]
fn reported_errors_ignore_empty_messages() {
    let mut context = InvocationContext::detached(HandleArena::new());
    assert_eq!(context.reported_error(), None);
    context.error_string[0] = 3;
    context.error_string[1..4].copy_from_slice(b"bad");
    assert_eq!(context.reported_error().as_deref(), Some("bad"));
}
