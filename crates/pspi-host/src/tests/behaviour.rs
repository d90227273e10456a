//! Behaviour-driven tests for discovery and filter runs.

use std::fs;
use std::rc::Rc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::abi::{ImageMode, Selector, codes, tags};
use crate::error::{Completion, PluginError};
use crate::host::{Drawable, MemoryImage, MemoryStateStore, PixelFormat};
use crate::module::EntryPoint;
use crate::registry::discovery;
use crate::registry::{CommandKind, CommandList, FilterRegistry};
use crate::runner::{FilterRunner, RunMode};

use super::fakes::{FakeLoader, InvertEntry, ScriptedEntry};
use super::pe::PeBuilder;
use super::pipl::PiplBuilder;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    plugins: Option<TempDir>,
    cancel_parameters: bool,
    registry: FilterRegistry,
    commands: CommandList,
    image: Option<MemoryImage>,
    result: Option<Result<Completion, PluginError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rgb_only_invert() -> Vec<u8> {
    let manifest = PiplBuilder::new()
        .kind(&tags::FILTER_KIND_PAYLOAD)
        .version(4, 0)
        .modes(&[ImageMode::RgbColor])
        .category("Test")
        .name("Invert...")
        .entry_x64("DoInvert")
        .entry_x86("DoInvert")
        .build();
    PeBuilder::new()
        .pipl(16000, &manifest)
        .export("DoInvert")
        .build()
}

fn parse_format(name: &str) -> PixelFormat {
    match name {
        "RGB" => PixelFormat::Rgb,
        "RGBA" => PixelFormat::Rgba,
        "GRAY" => PixelFormat::Gray,
        "GRAYA" => PixelFormat::GrayA,
        other => panic!("unsupported pixel format '{other}'"),
    }
}

fn entry_for(world: &TestWorld) -> Rc<dyn EntryPoint> {
    if world.cancel_parameters {
        Rc::new(ScriptedEntry::new().returning(Selector::Parameters, codes::USER_CANCELED_ERR))
    } else {
        Rc::new(InvertEntry::new(1))
    }
}

/// Splits every pixel of the world's image into colour and alpha samples.
fn samples(world: &TestWorld) -> (Vec<u8>, Vec<u8>) {
    let image = world.image.as_ref().expect("no image was filtered");
    let format = image.pixel_format();
    let colours = format.bytes_per_pixel() - usize::from(format.has_alpha());
    let mut colour = Vec::new();
    let mut alpha = Vec::new();
    for pixel in image.pixels().chunks_exact(format.bytes_per_pixel()) {
        let (head, tail) = pixel.split_at(colours);
        colour.extend_from_slice(head);
        alpha.extend_from_slice(tail);
    }
    (colour, alpha)
}

fn result(world: &TestWorld) -> &Result<Completion, PluginError> {
    world.result.as_ref().expect("no command was run")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a plug-in directory with an RGB-only invert filter")]
fn given_invert_directory(world: &mut TestWorld) {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("Invert.8bf"), rgb_only_invert()).expect("write module");
    world.plugins = Some(dir);
}

#[given("the filter cancels its parameter dialog")]
fn given_cancelling_filter(world: &mut TestWorld) {
    world.cancel_parameters = true;
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the search path is scanned")]
fn when_scanned(world: &mut TestWorld) {
    let dir = world.plugins.as_ref().expect("no plug-in directory");
    world.registry = discovery::scan(&[dir.path().to_path_buf()], &FilterRegistry::new());
    world.registry.install(&mut world.commands);
}

#[when("the command {name} runs on a {format} image of {width} by {height} pixels filled with {value}")]
fn when_run(
    world: &mut TestWorld,
    name: String,
    format: String,
    width: u32,
    height: u32,
    value: u8,
) {
    let pixel_format = parse_format(format.trim_matches('"'));
    let length = usize::try_from(width * height).expect("small image") * pixel_format.bytes_per_pixel();
    let mut image =
        MemoryImage::new(pixel_format, width, height, vec![value; length]).expect("image");
    let loader = FakeLoader::new().with("DoInvert", entry_for(world));
    let mut runner = FilterRunner::new(world.registry.clone(), loader, MemoryStateStore::new());
    world.result = Some(runner.run_filter(name.trim_matches('"'), RunMode::Interactive, &mut image));
    world.image = Some(image);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the command {name} is installed at {menu}")]
fn then_installed_at(world: &mut TestWorld, name: String, menu: String) {
    let command = name.trim_matches('"');
    let spec = world
        .commands
        .commands()
        .iter()
        .find(|spec| spec.kind == CommandKind::Filter && spec.name == command)
        .unwrap_or_else(|| panic!("command '{command}' not installed"));
    assert_eq!(spec.menu_path, menu.trim_matches('"'));
}

#[then("the command {name} accepts {types}")]
fn then_accepts(world: &mut TestWorld, name: String, types: String) {
    let command = name.trim_matches('"');
    let spec = world
        .commands
        .commands()
        .iter()
        .find(|spec| spec.name == command)
        .unwrap_or_else(|| panic!("command '{command}' not installed"));
    assert_eq!(spec.image_types, types.trim_matches('"'));
}

#[then("the about command {name} is installed")]
fn then_about_installed(world: &mut TestWorld, name: String) {
    let command = name.trim_matches('"');
    assert!(
        world
            .commands
            .commands()
            .iter()
            .any(|spec| spec.kind == CommandKind::About && spec.name == command),
        "about command '{command}' not installed"
    );
}

#[then("the run completes")]
fn then_completes(world: &mut TestWorld) {
    assert!(
        matches!(result(world), Ok(Completion::Completed)),
        "expected completion, got {:?}",
        result(world)
    );
}

#[then("the run is cancelled")]
fn then_cancelled(world: &mut TestWorld) {
    assert!(
        matches!(result(world), Ok(Completion::Cancelled)),
        "expected cancellation, got {:?}",
        result(world)
    );
}

#[then("the run fails with {error_kind}")]
fn then_fails(world: &mut TestWorld, error_kind: String) {
    let error = result(world)
        .as_ref()
        .expect_err("expected error but got success");
    match error_kind.trim_matches('"') {
        "unsupported_image_type" => assert!(
            matches!(error, PluginError::UnsupportedImageType { .. }),
            "expected UnsupportedImageType, got: {error}"
        ),
        "unknown_command" => assert!(
            matches!(error, PluginError::UnknownCommand { .. }),
            "expected UnknownCommand, got: {error}"
        ),
        other => panic!(
            "unsupported error kind: '{other}' (supported: unsupported_image_type, unknown_command)"
        ),
    }
}

#[then("every colour sample is {value}")]
fn then_colour_samples(world: &mut TestWorld, value: u8) {
    let (colour, _) = samples(world);
    assert!(!colour.is_empty(), "image has colour samples");
    assert!(
        colour.iter().all(|sample| *sample == value),
        "expected every colour sample to be {value}: {colour:?}"
    );
}

#[then("every alpha sample is {value}")]
fn then_alpha_samples(world: &mut TestWorld, value: u8) {
    let (_, alpha) = samples(world);
    assert!(!alpha.is_empty(), "image has an alpha plane");
    assert!(
        alpha.iter().all(|sample| *sample == value),
        "expected every alpha sample to be {value}: {alpha:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "Discovered filters are installed under the filter menu"
)]
fn installation(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "Inverting an RGB image"
)]
fn rgb_inversion(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "RGBA images keep their alpha plane"
)]
fn rgba_alpha(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "Cancelling the parameter dialog leaves the image untouched"
)]
fn parameter_cancellation(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "Gray images are rejected by an RGB-only filter"
)]
fn gray_rejection(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/filter_run.feature",
    name = "Unknown commands are calling errors"
)]
fn unknown_command(world: TestWorld) {
    drop(world);
}
