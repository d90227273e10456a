//! Unit tests for the filter lifecycle.

use std::ffi::c_void;

use rstest::rstest;

use super::*;
use crate::abi::fixed_to_long;
use crate::host::{MemoryImage, PixelRect};
use crate::tests::fakes::{InvertEntry, ScriptedEntry};

fn image(format: PixelFormat) -> MemoryImage {
    let size = 4 * 2 * format.bytes_per_pixel();
    MemoryImage::new(format, 4, 2, vec![50; size]).expect("image")
}

fn run(entry: &ScriptedEntry, host: &mut MemoryImage) -> Result<Completion, PluginError> {
    let session = FilterSession::new(entry, host, HandleArena::new());
    match session.prepare(None)? {
        Step::Ready(prepared) => prepared.run(),
        Step::Cancelled => Ok(Completion::Cancelled),
    }
}

fn whole_image() -> Rect {
    Rect::new(0, 0, 2, 4)
}

// ---------------------------------------------------------------------------
// Phase ordering
// ---------------------------------------------------------------------------

#[test]
fn phases_run_in_order() {
    let entry = ScriptedEntry::new().requesting(whole_image());
    let mut host = image(PixelFormat::Rgb);

    assert_eq!(run(&entry, &mut host).expect("run"), Completion::Completed);

    assert_eq!(
        entry.selectors(),
        [
            Selector::Prepare,
            Selector::Start,
            Selector::Continue,
            Selector::Finish
        ]
    );
}

#[test]
fn parameters_then_prepare_keeps_the_chosen_block() {
    let entry = ScriptedEntry::new().choosing(b"\x01\x02", 9);
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());

    let Step::Ready(queried) = session.query_parameters().expect("parameters") else {
        panic!("parameters were cancelled");
    };
    let state = queried.persisted_state();
    assert_eq!(state.data, 9);
    assert_eq!(
        state.parameters.map(|parameters| parameters.bytes),
        Some(vec![1, 2])
    );
    let Step::Ready(prepared) = queried.prepare().expect("prepare") else {
        panic!("prepare was cancelled");
    };
    assert_eq!(prepared.context().data(), 9);
    let prepare = entry.observed(Selector::Prepare).expect("prepare observed");
    assert_eq!(prepare.parameters, Some(vec![1, 2]));
}

#[rstest]
#[case::at_parameters(Selector::Parameters)]
#[case::at_prepare(Selector::Prepare)]
fn early_cancellation_stops_the_session(#[case] selector: Selector) {
    let entry = ScriptedEntry::new().returning(selector, codes::USER_CANCELED_ERR);
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());

    let cancelled = if selector == Selector::Parameters {
        matches!(session.query_parameters(), Ok(Step::Cancelled))
    } else {
        matches!(session.prepare(None), Ok(Step::Cancelled))
    };

    assert!(cancelled);
    assert_eq!(entry.selectors(), [selector]);
}

#[test]
fn cancelled_start_skips_finish() {
    let entry = ScriptedEntry::new()
        .requesting(whole_image())
        .returning(Selector::Start, codes::USER_CANCELED_ERR);
    let mut host = image(PixelFormat::Rgb);

    assert_eq!(run(&entry, &mut host).expect("run"), Completion::Cancelled);
    assert_eq!(entry.selectors(), [Selector::Prepare, Selector::Start]);
}

#[test]
fn cancelled_continue_still_finishes() {
    let entry = ScriptedEntry::new()
        .requesting(whole_image())
        .returning(Selector::Continue, codes::USER_CANCELED_ERR);
    let mut host = image(PixelFormat::Rgb);

    assert_eq!(run(&entry, &mut host).expect("run"), Completion::Cancelled);
    assert_eq!(
        entry.selectors(),
        [
            Selector::Prepare,
            Selector::Start,
            Selector::Continue,
            Selector::Finish
        ]
    );
}

#[rstest]
#[case::prepare(Selector::Prepare, codes::MEM_FULL_ERR, PluginFailure::OutOfMemory)]
#[case::start(Selector::Start, codes::FILTER_BAD_PARAMETERS, PluginFailure::BadParameters)]
#[case::finish(Selector::Finish, -1, PluginFailure::Other(-1))]
fn failures_name_their_phase(
    #[case] selector: Selector,
    #[case] code: i16,
    #[case] failure: PluginFailure,
) {
    let entry = ScriptedEntry::new().returning(selector, code);
    let mut host = image(PixelFormat::Rgb);

    let error = run(&entry, &mut host).expect_err("phase fails");

    assert!(
        matches!(&error, PluginError::Execution { phase, failure: actual } if *phase == selector && *actual == failure),
        "unexpected error {error:?}"
    );
    assert_eq!(entry.selectors().last(), Some(&selector));
}

/// Delegates to an entry but overrides one phase's result.
struct FailAt<E> {
    entry: E,
    selector: Selector,
    code: i16,
}

impl<E: EntryPoint> EntryPoint for FailAt<E> {
    unsafe fn invoke(&self, selector: Selector, record: *mut c_void, data: *mut isize) -> i16 {
        // SAFETY: the caller's contract is passed through unchanged.
        let code = unsafe { self.entry.invoke(selector, record, data) };
        if selector == self.selector { self.code } else { code }
    }
}

#[test]
fn failed_finish_discards_output() {
    let entry = FailAt {
        entry: InvertEntry::new(1),
        selector: Selector::Finish,
        code: codes::MEM_FULL_ERR,
    };
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    let Step::Ready(prepared) = session.prepare(None).expect("prepare") else {
        panic!("prepare was cancelled");
    };

    let error = prepared.run().expect_err("finish fails");

    assert!(matches!(error, PluginError::Execution { phase: Selector::Finish, .. }));
    assert!(host.pixels().iter().all(|value| *value == 50));
}

/// Asks for an inverted plane range with the tile requested at Continue.
struct InvertedPlanesAtContinue(InvertEntry);

impl EntryPoint for InvertedPlanesAtContinue {
    unsafe fn invoke(&self, selector: Selector, record: *mut c_void, data: *mut isize) -> i16 {
        // SAFETY: the caller's contract is passed through unchanged.
        let code = unsafe { self.0.invoke(selector, record, data) };
        if selector == Selector::Continue {
            // SAFETY: filter selectors receive the live filter record.
            let filter_record = unsafe { &mut *record.cast::<FilterRecord>() };
            filter_record.in_lo_plane = 2;
            filter_record.in_hi_plane = 0;
        }
        code
    }
}

fn assert_continue_failed_and_finished(selectors: &[Selector], error: &PluginError) {
    assert_eq!(
        selectors,
        [
            Selector::Prepare,
            Selector::Start,
            Selector::Continue,
            Selector::Finish
        ]
    );
    assert!(
        matches!(
            error,
            PluginError::Execution {
                phase: Selector::Continue,
                failure: PluginFailure::BadParameters,
            }
        ),
        "unexpected error {error:?}"
    );
}

#[test]
fn failed_continue_finishes_once_and_discards_output() {
    let entry = FailAt {
        entry: InvertEntry::new(1),
        selector: Selector::Continue,
        code: codes::FILTER_BAD_PARAMETERS,
    };
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    let Step::Ready(prepared) = session.prepare(None).expect("prepare") else {
        panic!("prepare was cancelled");
    };

    let error = prepared.run().expect_err("continue fails");

    assert_continue_failed_and_finished(&entry.entry.selectors(), &error);
    assert!(host.pixels().iter().all(|value| *value == 50));
}

#[test]
fn rejected_tile_request_finishes_once_and_discards_output() {
    let entry = InvertedPlanesAtContinue(InvertEntry::new(1));
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    let Step::Ready(prepared) = session.prepare(None).expect("prepare") else {
        panic!("prepare was cancelled");
    };

    let error = prepared.run().expect_err("inverted planes are rejected");

    assert_continue_failed_and_finished(&entry.0.selectors(), &error);
    assert!(host.pixels().iter().all(|value| *value == 50));
}

#[test]
fn failed_final_store_is_reported_against_finish() {
    let entry = ScriptedEntry::new();
    let session = FilterSession::<Prepared> {
        context: InvocationContext::detached(HandleArena::new()),
        entry: &entry,
        state: PhantomData,
    };

    let error = session.run().expect_err("no drawable to store into");

    assert!(
        matches!(error, PluginError::Execution { phase: Selector::Finish, .. }),
        "unexpected error {error:?}"
    );
    assert_eq!(entry.selectors(), [Selector::Start, Selector::Finish]);
}

#[test]
fn successful_runs_commit_output() {
    let entry = InvertEntry::new(1);
    let mut host = image(PixelFormat::Rgb);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    let Step::Ready(prepared) = session.prepare(None).expect("prepare") else {
        panic!("prepare was cancelled");
    };
    assert_eq!(prepared.run().expect("run"), Completion::Completed);
    assert!(host.pixels().iter().all(|value| *value == 205));
    let continues = entry
        .selectors()
        .into_iter()
        .filter(|selector| *selector == Selector::Continue)
        .count();
    assert_eq!(continues, 2);
}

#[test]
fn drawables_without_a_mode_cannot_be_prepared() {
    let entry = ScriptedEntry::new();
    let mut host = image(PixelFormat::Indexed);
    let error = run(&entry, &mut host).expect_err("indexed is unsupported");
    assert!(matches!(error, PluginError::UnsupportedImageType { .. }));
    assert!(entry.selectors().is_empty());
}

// ---------------------------------------------------------------------------
// Record layout
// ---------------------------------------------------------------------------

#[rstest]
#[case::rgb(PixelFormat::Rgb, ImageMode::RgbColor, 3, 0)]
#[case::rgba(PixelFormat::Rgba, ImageMode::RgbColor, 3, 1)]
#[case::gray(PixelFormat::Gray, ImageMode::GrayScale, 1, 0)]
#[case::gray_alpha(PixelFormat::GrayA, ImageMode::GrayScale, 1, 1)]
fn formats_map_onto_modes(
    #[case] format: PixelFormat,
    #[case] mode: ImageMode,
    #[case] layer_planes: i16,
    #[case] transparency_mask: i16,
) {
    let layout = ModeLayout::for_format(format).expect("supported");
    assert_eq!(
        layout,
        ModeLayout {
            mode,
            layer_planes,
            transparency_mask
        }
    );
}

#[rstest]
#[case::indexed(PixelFormat::Indexed)]
#[case::indexed_alpha(PixelFormat::IndexedA)]
fn indexed_formats_have_no_mode(#[case] format: PixelFormat) {
    assert!(ModeLayout::for_format(format).is_err());
}

#[test]
fn prepare_sees_the_selection_and_geometry() {
    let entry = ScriptedEntry::new();
    let mut host = image(PixelFormat::GrayA)
        .with_selection(PixelRect::new(1, 0, 2, 1))
        .with_resolution(299.6, 72.0);
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    let Step::Ready(prepared) = session.prepare(None).expect("prepare") else {
        panic!("prepare was cancelled");
    };

    let record = prepared.context().record();
    let (filter_rect, image_size, planes) = (record.filter_rect, record.image_size, record.planes);
    let (h_res, v_res) = (record.image_h_res, record.image_v_res);
    let (image_mode, column_bytes) = (record.image_mode, record.in_column_bytes);
    assert_eq!(filter_rect, Rect::new(0, 1, 1, 3));
    assert_eq!((image_size.h, image_size.v), (4, 2));
    assert_eq!(planes, 2);
    assert_eq!((fixed_to_long(h_res), fixed_to_long(v_res)), (300, 72));
    assert_eq!(image_mode, ImageMode::GrayScale.code());
    assert_eq!(column_bytes, 0);
    let observed = entry.observed(Selector::Prepare).expect("prepare observed");
    assert_eq!(observed.transparency_mask, 1);
}

#[test]
fn restored_state_reaches_prepare() {
    let entry = ScriptedEntry::new();
    let mut host = image(PixelFormat::Rgb);
    let saved = PersistedState {
        parameters: Some(SavedParameters {
            representation: crate::handle::HandleRepresentation::Arena,
            bytes: b"abc".to_vec(),
        }),
        data: -5,
    };
    let session = FilterSession::new(&entry, &mut host, HandleArena::new());
    assert!(matches!(session.prepare(Some(&saved)), Ok(Step::Ready(_))));
    let observed = entry.observed(Selector::Prepare).expect("prepare observed");
    assert_eq!(observed.parameters, Some(b"abc".to_vec()));
    assert_eq!(observed.data, -5);
}

// ---------------------------------------------------------------------------
// About
// ---------------------------------------------------------------------------

#[test]
fn about_calls_every_entry() {
    let first = ScriptedEntry::new();
    let second = ScriptedEntry::new();
    let entries: [&dyn EntryPoint; 2] = [&first, &second];
    assert_eq!(
        show_about(&entries, HandleArena::new()).expect("about"),
        Completion::Completed
    );
    assert_eq!(first.selectors(), [Selector::About]);
    assert_eq!(second.selectors(), [Selector::About]);
}

#[rstest]
#[case::failure(codes::FILTER_BAD_PARAMETERS, false)]
#[case::cancel(codes::USER_CANCELED_ERR, true)]
fn about_stops_at_the_first_unsuccessful_entry(#[case] code: i16, #[case] cancelled: bool) {
    let first = ScriptedEntry::new().returning(Selector::About, code);
    let second = ScriptedEntry::new();
    let entries: [&dyn EntryPoint; 2] = [&first, &second];

    let result = show_about(&entries, HandleArena::new());

    assert_eq!(matches!(result, Ok(Completion::Cancelled)), cancelled);
    assert_eq!(
        matches!(result, Err(PluginError::Execution { phase: Selector::About, .. })),
        !cancelled
    );
    assert!(second.selectors().is_empty());
}
