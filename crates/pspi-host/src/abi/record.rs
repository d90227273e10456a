//! Fixed-layout records and callback tables.
//!
//! The legacy headers are compiled with four-byte packing on Windows, which
//! `repr(C, packed(4))` reproduces for both pointer widths. Fields whose
//! alignment exceeds four bytes can only be copied, never borrowed.

use std::ffi::{c_char, c_void};

use super::{BufferId, Fixed, FourCc, Handle, OsErr, Point, Rect, RgbColor, Str255, VRect};

/// Returns `true` when the host should stop.
pub type TestAbortProc = unsafe extern "C" fn() -> u8;
/// Reports progress as `done` of `total`.
pub type ProgressProc = unsafe extern "C" fn(done: i32, total: i32);
/// Host-specific escape hatch.
pub type HostProc = unsafe extern "C" fn(selector: i16, data: *mut isize);
/// Lets the host process a platform event.
pub type ProcessEventProc = unsafe extern "C" fn(event: *mut c_void);
/// Draws a pixel map into a platform context.
pub type DisplayPixelsProc = unsafe extern "C" fn(
    source: *const PixelMap,
    source_rect: *const VRect,
    destination_row: i32,
    destination_column: i32,
    platform_context: *mut c_void,
) -> OsErr;
/// Services the pending tile requests immediately.
pub type AdvanceStateProc = unsafe extern "C" fn() -> OsErr;
/// Colour picker and conversion services.
pub type ColorServicesProc = unsafe extern "C" fn(info: *mut c_void) -> OsErr;
/// Reads a host property.
pub type GetPropertyProc = unsafe extern "C" fn(
    signature: FourCc,
    key: FourCc,
    index: i32,
    simple_property: *mut i32,
    complex_property: *mut Handle,
) -> OsErr;
/// Writes a host property.
pub type SetPropertyProc = unsafe extern "C" fn(
    signature: FourCc,
    key: FourCc,
    index: i32,
    simple_property: i32,
    complex_property: Handle,
) -> OsErr;
/// Interpolation entry point of the image services suite.
pub type InterpolateProc = unsafe extern "C" fn(
    source: *mut c_void,
    destination: *mut c_void,
    area: *mut Rect,
    coords: *mut Fixed,
    method: i16,
) -> OsErr;

/// Entry point exported by every filter module.
pub type FilterEntryFn =
    unsafe extern "system" fn(selector: i16, record: *mut c_void, data: *mut isize, result: *mut i16);

/// Native window handle wrapper passed in `platformData`.
#[repr(C, packed(4))]
#[derive(Clone, Copy, Default)]
pub struct PlatformData {
    /// Parent window, zero for none.
    pub hwnd: isize,
}

/// Monitor description, all values in 16.16 fixed point.
#[repr(C, packed(4))]
#[derive(Clone, Copy, Default)]
pub struct PlugInMonitor {
    /// Display gamma.
    pub gamma: Fixed,
    /// Red primary x.
    pub red_x: Fixed,
    /// Red primary y.
    pub red_y: Fixed,
    /// Green primary x.
    pub green_x: Fixed,
    /// Green primary y.
    pub green_y: Fixed,
    /// Blue primary x.
    pub blue_x: Fixed,
    /// Blue primary y.
    pub blue_y: Fixed,
    /// White point x.
    pub white_x: Fixed,
    /// White point y.
    pub white_y: Fixed,
    /// Ambient light.
    pub ambient: Fixed,
}

/// Leading fields of the pixel map passed to `displayPixels`.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct PixelMap {
    /// Structure version.
    pub version: i32,
    /// Area covered by `base_addr`.
    pub bounds: VRect,
    /// Image mode of the pixels.
    pub image_mode: i32,
    /// Bytes between rows.
    pub row_bytes: i32,
    /// Bytes between columns.
    pub col_bytes: i32,
    /// Bytes between planes.
    pub plane_bytes: i32,
    /// First pixel.
    pub base_addr: *mut c_void,
}

/// Buffer allocation suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct BufferProcs {
    /// Suite version.
    pub version: i16,
    /// Number of procedures that follow.
    pub count: i16,
    /// Allocates a buffer.
    pub allocate: Option<unsafe extern "C" fn(size: i32, buffer: *mut BufferId) -> OsErr>,
    /// Returns the buffer's address.
    pub lock: Option<unsafe extern "C" fn(buffer: BufferId, move_high: u8) -> *mut c_void>,
    /// Releases the address.
    pub unlock: Option<unsafe extern "C" fn(buffer: BufferId)>,
    /// Frees the buffer.
    pub free: Option<unsafe extern "C" fn(buffer: BufferId)>,
    /// Reports available buffer space.
    pub space: Option<unsafe extern "C" fn() -> i32>,
}

/// Handle management suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct HandleProcs {
    /// Suite version.
    pub version: i16,
    /// Number of procedures that follow.
    pub count: i16,
    /// Allocates a handle.
    pub new: Option<unsafe extern "C" fn(size: i32) -> Handle>,
    /// Releases a handle.
    pub dispose: Option<unsafe extern "C" fn(handle: Handle)>,
    /// Reports a handle's size.
    pub get_size: Option<unsafe extern "C" fn(handle: Handle) -> i32>,
    /// Resizes a handle in place.
    pub set_size: Option<unsafe extern "C" fn(handle: Handle, size: i32) -> OsErr>,
    /// Returns the handle's data address.
    pub lock: Option<unsafe extern "C" fn(handle: Handle, move_high: u8) -> *mut c_void>,
    /// Releases the data address.
    pub unlock: Option<unsafe extern "C" fn(handle: Handle)>,
    /// Advisory memory reclamation.
    pub recover_space: Option<unsafe extern "C" fn(size: i32)>,
    /// Legacy alias of `dispose`.
    pub dispose_regular: Option<unsafe extern "C" fn(handle: Handle)>,
}

/// Image resource suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct ResourceProcs {
    /// Suite version.
    pub version: i16,
    /// Number of procedures that follow.
    pub count: i16,
    /// Counts resources of a type.
    pub count_proc: Option<unsafe extern "C" fn(of_type: FourCc) -> i16>,
    /// Copies a resource into a new handle.
    pub get: Option<unsafe extern "C" fn(of_type: FourCc, index: i16) -> Handle>,
    /// Deletes a resource and compacts later indices.
    pub delete: Option<unsafe extern "C" fn(of_type: FourCc, index: i16)>,
    /// Appends a resource.
    pub add: Option<unsafe extern "C" fn(of_type: FourCc, data: Handle) -> OsErr>,
}

/// Property suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct PropertyProcs {
    /// Suite version.
    pub version: i16,
    /// Number of procedures that follow.
    pub count: i16,
    /// Reads a property.
    pub get: Option<GetPropertyProc>,
    /// Writes a property.
    pub set: Option<SetPropertyProc>,
}

/// Image interpolation suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct ImageServicesProcs {
    /// Suite version.
    pub version: i16,
    /// Number of procedures that follow.
    pub count: i16,
    /// One-dimensional interpolation.
    pub interpolate_1d: Option<InterpolateProc>,
    /// Two-dimensional interpolation.
    pub interpolate_2d: Option<InterpolateProc>,
    /// One-dimensional multi-plane interpolation.
    pub interpolate_1d_multi: Option<InterpolateProc>,
    /// Two-dimensional multi-plane interpolation.
    pub interpolate_2d_multi: Option<InterpolateProc>,
}

/// Basic extension suite.
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct SpBasicSuite {
    /// Acquires a named suite.
    pub acquire_suite: Option<
        unsafe extern "C" fn(name: *const c_char, version: i32, suite: *mut *const c_void) -> i32,
    >,
    /// Releases a named suite.
    pub release_suite: Option<unsafe extern "C" fn(name: *const c_char, version: i32) -> i32>,
    /// Compares two tokens.
    pub is_equal: Option<unsafe extern "C" fn(token1: *const c_char, token2: *const c_char) -> u8>,
    /// Allocates a block.
    pub allocate_block: Option<unsafe extern "C" fn(size: usize, block: *mut *mut c_void) -> i32>,
    /// Frees a block.
    pub free_block: Option<unsafe extern "C" fn(block: *mut c_void) -> i32>,
    /// Resizes a block.
    pub reallocate_block: Option<
        unsafe extern "C" fn(block: *mut c_void, size: usize, new_block: *mut *mut c_void) -> i32,
    >,
    /// Placeholder entry.
    pub undefined: Option<unsafe extern "C" fn() -> i32>,
}

/// Record passed with the about selector.
#[repr(C, packed(4))]
pub struct AboutRecord {
    /// Platform window data.
    pub platform_data: *mut c_void,
    /// Basic suite.
    pub sp_basic: *const SpBasicSuite,
    /// Plug-in reference, unused.
    pub plug_in_ref: *mut c_void,
    /// Reserved, zeroed.
    pub reserved: [u8; 244],
}

/// The shared filter record.
///
/// Layout follows the version 4.0 filter headers. The tail is padded with a
/// generous reserved area so modules built against later headers read zeros
/// rather than foreign memory.
#[repr(C, packed(4))]
pub struct FilterRecord {
    /// Serial number, unused.
    pub serial_number: i32,
    /// Abort test.
    pub abort_proc: Option<TestAbortProc>,
    /// Progress report.
    pub progress_proc: Option<ProgressProc>,
    /// Opaque parameter handle owned by the module.
    pub parameters: Handle,
    /// Drawable size.
    pub image_size: Point,
    /// Number of planes in the drawable.
    pub planes: i16,
    /// Area the filter applies to.
    pub filter_rect: Rect,
    /// Background colour.
    pub background: RgbColor,
    /// Foreground colour.
    pub foreground: RgbColor,
    /// Memory the module may use.
    pub max_space: i32,
    /// Memory the module requests for buffers.
    pub buffer_space: i32,
    /// Requested input area.
    pub in_rect: Rect,
    /// First requested input plane.
    pub in_lo_plane: i16,
    /// Last requested input plane.
    pub in_hi_plane: i16,
    /// Requested output area.
    pub out_rect: Rect,
    /// First requested output plane.
    pub out_lo_plane: i16,
    /// Last requested output plane.
    pub out_hi_plane: i16,
    /// Input pixels.
    pub in_data: *mut c_void,
    /// Input row stride.
    pub in_row_bytes: i32,
    /// Output pixels.
    pub out_data: *mut c_void,
    /// Output row stride.
    pub out_row_bytes: i32,
    /// Set for floating selections.
    pub is_floating: u8,
    /// Set when a mask is available.
    pub have_mask: u8,
    /// Set when the host applies the mask.
    pub auto_mask: u8,
    /// Requested mask area.
    pub mask_rect: Rect,
    /// Mask pixels.
    pub mask_data: *mut c_void,
    /// Mask row stride.
    pub mask_row_bytes: i32,
    /// Background colour in image mode.
    pub back_color: [u8; 4],
    /// Foreground colour in image mode.
    pub fore_color: [u8; 4],
    /// Host signature.
    pub host_sig: u32,
    /// Host escape hatch.
    pub host_proc: Option<HostProc>,
    /// Image mode.
    pub image_mode: i16,
    /// Horizontal resolution.
    pub image_h_res: Fixed,
    /// Vertical resolution.
    pub image_v_res: Fixed,
    /// Origin of a floating selection.
    pub float_coord: Point,
    /// Size of the whole image.
    pub whole_size: Point,
    /// Monitor description.
    pub monitor: PlugInMonitor,
    /// Platform window data.
    pub platform_data: *mut c_void,
    /// Buffer suite.
    pub buffer_procs: *const BufferProcs,
    /// Resource suite.
    pub resource_procs: *const ResourceProcs,
    /// Event processing.
    pub process_event: Option<ProcessEventProc>,
    /// Pixel display.
    pub display_pixels: Option<DisplayPixelsProc>,
    /// Handle suite.
    pub handle_procs: *const HandleProcs,
    /// Dummy channel support.
    pub supports_dummy_channels: u8,
    /// Alternate layout support.
    pub supports_alternate_layouts: u8,
    /// Requested layout.
    pub want_layout: i16,
    /// Filter case.
    pub filter_case: i16,
    /// Value for dummy planes.
    pub dummy_plane_value: i16,
    /// Premiere hook, unused.
    pub premiere_hook: *mut c_void,
    /// Immediate tile exchange.
    pub advance_state: Option<AdvanceStateProc>,
    /// Absolute data support.
    pub supports_absolute: u8,
    /// Absolute data requested.
    pub wants_absolute: u8,
    /// Obsolete property getter.
    pub get_property_obsolete: Option<GetPropertyProc>,
    /// Set when undo is impossible.
    pub cannot_undo: u8,
    /// Padding support.
    pub supports_padding: u8,
    /// Input padding mode.
    pub input_padding: i16,
    /// Output padding mode.
    pub output_padding: i16,
    /// Mask padding mode.
    pub mask_padding: i16,
    /// Sampling support.
    pub sampling_support: i8,
    /// Reserved.
    pub reserved_byte: i8,
    /// Input sampling rate.
    pub input_rate: Fixed,
    /// Mask sampling rate.
    pub mask_rate: Fixed,
    /// Colour services.
    pub color_services: Option<ColorServicesProc>,
    /// Input layer planes.
    pub in_layer_planes: i16,
    /// Input transparency planes.
    pub in_transparency_mask: i16,
    /// Input layer masks.
    pub in_layer_masks: i16,
    /// Input inverted layer masks.
    pub in_inverted_layer_masks: i16,
    /// Input non-layer planes.
    pub in_non_layer_planes: i16,
    /// Output layer planes.
    pub out_layer_planes: i16,
    /// Output transparency planes.
    pub out_transparency_mask: i16,
    /// Output layer masks.
    pub out_layer_masks: i16,
    /// Output inverted layer masks.
    pub out_inverted_layer_masks: i16,
    /// Output non-layer planes.
    pub out_non_layer_planes: i16,
    /// Absolute layer planes.
    pub abs_layer_planes: i16,
    /// Absolute transparency planes.
    pub abs_transparency_mask: i16,
    /// Absolute layer masks.
    pub abs_layer_masks: i16,
    /// Absolute inverted layer masks.
    pub abs_inverted_layer_masks: i16,
    /// Absolute non-layer planes.
    pub abs_non_layer_planes: i16,
    /// Input dummy planes before.
    pub in_pre_dummy_planes: i16,
    /// Input dummy planes after.
    pub in_post_dummy_planes: i16,
    /// Output dummy planes before.
    pub out_pre_dummy_planes: i16,
    /// Output dummy planes after.
    pub out_post_dummy_planes: i16,
    /// Input column step.
    pub in_column_bytes: i32,
    /// Input plane step.
    pub in_plane_bytes: i32,
    /// Output column step.
    pub out_column_bytes: i32,
    /// Output plane step.
    pub out_plane_bytes: i32,
    /// Image services suite.
    pub image_services_procs: *const ImageServicesProcs,
    /// Property suite.
    pub property_procs: *const PropertyProcs,
    /// Input tile height.
    pub in_tile_height: i16,
    /// Input tile width.
    pub in_tile_width: i16,
    /// Input tile origin.
    pub in_tile_origin: Point,
    /// Absolute tile height.
    pub abs_tile_height: i16,
    /// Absolute tile width.
    pub abs_tile_width: i16,
    /// Absolute tile origin.
    pub abs_tile_origin: Point,
    /// Output tile height.
    pub out_tile_height: i16,
    /// Output tile width.
    pub out_tile_width: i16,
    /// Output tile origin.
    pub out_tile_origin: Point,
    /// Mask tile height.
    pub mask_tile_height: i16,
    /// Mask tile width.
    pub mask_tile_width: i16,
    /// Mask tile origin.
    pub mask_tile_origin: Point,
    /// Scripting descriptors, unsupported.
    pub descriptor_parameters: *mut c_void,
    /// Message buffer for the report-string error.
    pub error_string: *mut Str255,
    /// Channel ports, unsupported.
    pub channel_port_procs: *mut c_void,
    /// Document description, unsupported.
    pub document_info: *mut c_void,
    /// Basic suite.
    pub sp_basic: *const SpBasicSuite,
    /// Plug-in reference, unused.
    pub plug_in_ref: *mut c_void,
    /// Bits per channel.
    pub depth: i32,
    /// ICC profile, unsupported.
    pub icc_profile_data: Handle,
    /// ICC profile size.
    pub icc_profile_size: i32,
    /// ICC profile support.
    pub can_use_icc_profiles: i32,
    /// Reserved, zeroed.
    pub reserved: [u8; 512],
}

impl FilterRecord {
    /// Returns a record with every field zeroed or null.
    #[must_use]
    pub fn zeroed() -> Box<Self> {
        // SAFETY: every field is an integer, a raw pointer, an optional
        // function pointer or an array of those, all of which are valid when
        // zeroed.
        Box::new(unsafe { std::mem::zeroed() })
    }
}

impl AboutRecord {
    /// Returns a record with every field zeroed or null.
    #[must_use]
    pub fn zeroed() -> Self {
        // SAFETY: raw pointers and bytes are valid when zeroed.
        unsafe { std::mem::zeroed() }
    }
}
