//! The filter lifecycle.
//!
//! A [`FilterSession`] walks a module through Parameters, Prepare, Start,
//! the Continue loop and Finish. Each phase consumes the session and
//! returns it in the next state, so Continue cannot be reached without a
//! successful Start and Finish runs exactly once. Every result code goes
//! through [`PluginOutcome::decode`].
//!
//! ```text
//! Uninitialized --query_parameters--> ParametersQueried
//!       |                                   |
//!       +-----------prepare-----------------+--> Prepared --run--> Completion
//! ```

pub mod exchange;

use std::marker::PhantomData;
use std::ptr;

use tracing::{debug, info, warn};

use crate::abi::{
    FilterRecord, Fixed, ImageMode, Point, Rect, Selector, codes, long_to_fixed,
};
use crate::context::InvocationContext;
use crate::error::{Completion, PluginError};
use crate::handle::HandleArena;
use crate::host::{FilterHost, PersistedState, PixelFormat, SavedParameters};
use crate::module::EntryPoint;
use crate::outcome::{PluginFailure, PluginOutcome};

/// Session state before any phase ran.
#[derive(Debug)]
pub struct Uninitialized;

/// Session state after a successful parameter query.
#[derive(Debug)]
pub struct ParametersQueried;

/// Session state after a successful Prepare.
#[derive(Debug)]
pub struct Prepared;

/// Result of a phase the user may cancel.
#[derive(Debug)]
pub enum Step<T> {
    /// The phase succeeded.
    Ready(T),
    /// The module reported a cancel code.
    Cancelled,
}

/// One filter invocation against one drawable.
pub struct FilterSession<'a, S> {
    context: InvocationContext<'a>,
    entry: &'a dyn EntryPoint,
    state: PhantomData<S>,
}

impl<S> std::fmt::Debug for FilterSession<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSession")
            .field("context", &self.context)
            .field("state", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

impl<'a> FilterSession<'a, Uninitialized> {
    /// Creates a session calling `entry` against `host`.
    #[must_use]
    pub fn new(entry: &'a dyn EntryPoint, host: &'a mut dyn FilterHost, handles: HandleArena) -> Self {
        Self {
            context: InvocationContext::new(host, handles),
            entry,
            state: PhantomData,
        }
    }

    /// Runs the Parameters phase, usually a dialog.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Execution`] when the module fails.
    pub fn query_parameters(
        mut self,
    ) -> Result<Step<FilterSession<'a, ParametersQueried>>, PluginError> {
        Ok(match self.invoke(Selector::Parameters)? {
            Step::Ready(()) => Step::Ready(self.transition()),
            Step::Cancelled => Step::Cancelled,
        })
    }

    /// Runs the Prepare phase with previously saved state, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnsupportedImageType`] for drawables without a
    /// filter mode and [`PluginError::Execution`] when the module fails.
    pub fn prepare(
        mut self,
        saved: Option<&PersistedState>,
    ) -> Result<Step<FilterSession<'a, Prepared>>, PluginError> {
        if let Some(state) = saved {
            self.restore(state);
        }
        self.prepare_phase()
    }
}

impl<'a> FilterSession<'a, ParametersQueried> {
    /// Snapshot of the parameters the module just chose.
    #[must_use]
    pub fn persisted_state(&self) -> PersistedState {
        let parameters = self.context.record().parameters;
        PersistedState {
            parameters: self
                .context
                .handles()
                .snapshot(parameters)
                .map(|(representation, bytes)| SavedParameters {
                    representation,
                    bytes,
                }),
            data: self.context.data(),
        }
    }

    /// Runs the Prepare phase, keeping the parameters just queried.
    ///
    /// # Errors
    ///
    /// As for the first Prepare of an uninitialized session.
    pub fn prepare(mut self) -> Result<Step<FilterSession<'a, Prepared>>, PluginError> {
        self.prepare_phase()
    }
}

impl FilterSession<'_, Prepared> {
    /// Runs Start, the Continue loop and Finish, then commits the output.
    ///
    /// A failing Continue is followed by a best-effort Finish and the
    /// Continue error is returned. When storing the last output fails, Finish
    /// still runs and the failure is reported against Finish. Output is only
    /// committed on success.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Execution`] naming the failing phase.
    pub fn run(mut self) -> Result<Completion, PluginError> {
        if let Step::Cancelled = self.invoke(Selector::Start)? {
            self.abandon();
            return Ok(Completion::Cancelled);
        }
        let mut tiles = 0_usize;
        while requests_pending(self.context.record()) {
            let code = self.context.advance();
            let step = if code == codes::NO_ERR {
                self.invoke(Selector::Continue)
            } else {
                Err(PluginError::Execution {
                    phase: Selector::Continue,
                    failure: decode_failure(code),
                })
            };
            match step {
                Ok(Step::Ready(())) => tiles += 1,
                Ok(Step::Cancelled) => {
                    self.finish_best_effort();
                    self.abandon();
                    return Ok(Completion::Cancelled);
                }
                Err(error) => {
                    self.finish_best_effort();
                    self.abandon();
                    return Err(error);
                }
            }
        }
        let code = self.context.advance();
        if code != codes::NO_ERR {
            warn!(code, "final tile exchange failed");
            self.finish_best_effort();
            self.abandon();
            return Err(PluginError::Execution {
                phase: Selector::Finish,
                failure: decode_failure(code),
            });
        }
        debug!(tiles, "tile exchange finished");
        if let Err(error) = self.invoke(Selector::Finish) {
            self.abandon();
            return Err(error);
        }
        if let Some(host) = self.context.host() {
            host.commit();
        }
        info!(tiles, "filter applied");
        Ok(Completion::Completed)
    }

    fn finish_best_effort(&mut self) {
        let code = self.context.call(self.entry, Selector::Finish);
        if code != codes::NO_ERR {
            warn!(code, "filterSelectorFinish failed after an earlier error");
        }
    }

    fn abandon(&mut self) {
        self.context.release_tiles();
        if let Some(host) = self.context.host() {
            host.discard();
        }
    }
}

impl<'a, S> FilterSession<'a, S> {
    /// The invocation context, for inspection.
    #[must_use]
    pub const fn context(&self) -> &InvocationContext<'a> {
        &self.context
    }

    fn transition<T>(self) -> FilterSession<'a, T> {
        FilterSession {
            context: self.context,
            entry: self.entry,
            state: PhantomData,
        }
    }

    fn invoke(&mut self, selector: Selector) -> Result<Step<()>, PluginError> {
        let code = self.context.call(self.entry, selector);
        match PluginOutcome::decode(code, || self.context.reported_error()) {
            PluginOutcome::Success => Ok(Step::Ready(())),
            PluginOutcome::Cancelled => {
                info!(%selector, "cancelled by the user");
                Ok(Step::Cancelled)
            }
            PluginOutcome::Failed(failure) => Err(PluginError::Execution {
                phase: selector,
                failure,
            }),
        }
    }

    fn restore(&mut self, state: &PersistedState) {
        let parameters = state.parameters.as_ref().map_or(ptr::null_mut(), |saved| {
            self.context
                .handles_mut()
                .restore(saved.representation, &saved.bytes)
        });
        debug!(
            restored = !parameters.is_null(),
            data = state.data,
            "restoring saved state"
        );
        self.context.record_mut().parameters = parameters;
        self.context.set_data(state.data);
    }

    fn prepare_phase(mut self) -> Result<Step<FilterSession<'a, Prepared>>, PluginError> {
        let host = self.context.host_ref().ok_or_else(|| PluginError::Calling {
            message: "a filter run needs a drawable".to_owned(),
        })?;
        let layout = ModeLayout::for_format(host.pixel_format())?;
        let geometry = Geometry::of(host);
        let record = self.context.record_mut();
        geometry.apply(record);
        layout.apply(record);
        Ok(match self.invoke(Selector::Prepare)? {
            Step::Ready(()) => Step::Ready(self.transition()),
            Step::Cancelled => Step::Cancelled,
        })
    }
}

/// Shows the about box of a module by calling every one of its entries.
///
/// At most one entry is expected to display anything. The first failure
/// or cancellation stops the walk.
///
/// # Errors
///
/// Returns [`PluginError::Execution`] for the About phase.
pub fn show_about(
    entries: &[&dyn EntryPoint],
    handles: HandleArena,
) -> Result<Completion, PluginError> {
    let mut context = InvocationContext::detached(handles);
    for entry in entries {
        let code = context.call_about(*entry);
        match PluginOutcome::decode(code, || context.reported_error()) {
            PluginOutcome::Success => {}
            PluginOutcome::Cancelled => return Ok(Completion::Cancelled),
            PluginOutcome::Failed(failure) => {
                return Err(PluginError::Execution {
                    phase: Selector::About,
                    failure,
                });
            }
        }
    }
    Ok(Completion::Completed)
}

/// How a host pixel format is described to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeLayout {
    /// Filter image mode.
    pub mode: ImageMode,
    /// Colour planes.
    pub layer_planes: i16,
    /// `1` when an alpha plane follows the colour planes.
    pub transparency_mask: i16,
}

impl ModeLayout {
    /// Maps `format` onto a mode, plane count and transparency flag.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnsupportedImageType`] for indexed formats.
    ///
    /// # Example
    ///
    /// ```
    /// use pspi_host::abi::ImageMode;
    /// use pspi_host::filter::ModeLayout;
    /// use pspi_host::host::PixelFormat;
    ///
    /// let layout = ModeLayout::for_format(PixelFormat::Rgba).expect("rgba maps");
    /// assert_eq!(layout.mode, ImageMode::RgbColor);
    /// assert_eq!((layout.layer_planes, layout.transparency_mask), (3, 1));
    /// ```
    pub fn for_format(format: PixelFormat) -> Result<Self, PluginError> {
        let (mode, layer_planes) = match format {
            PixelFormat::Rgb | PixelFormat::Rgba => (ImageMode::RgbColor, 3),
            PixelFormat::Gray | PixelFormat::GrayA => (ImageMode::GrayScale, 1),
            PixelFormat::Indexed | PixelFormat::IndexedA => {
                return Err(PluginError::UnsupportedImageType {
                    image_type: format.to_string(),
                });
            }
        };
        Ok(Self {
            mode,
            layer_planes,
            transparency_mask: i16::from(format.has_alpha()),
        })
    }

    fn apply(self, record: &mut FilterRecord) {
        record.image_mode = self.mode.code();
        record.in_layer_planes = self.layer_planes;
        record.in_transparency_mask = self.transparency_mask;
        record.in_layer_masks = 0;
        record.in_inverted_layer_masks = 0;
        record.in_non_layer_planes = 0;
        record.out_layer_planes = self.layer_planes;
        record.out_transparency_mask = self.transparency_mask;
        record.out_layer_masks = 0;
        record.out_inverted_layer_masks = 0;
        record.out_non_layer_planes = 0;
        record.abs_layer_planes = self.layer_planes;
        record.abs_transparency_mask = self.transparency_mask;
        record.abs_layer_masks = 0;
        record.abs_inverted_layer_masks = 0;
        record.abs_non_layer_planes = 0;
        record.in_pre_dummy_planes = 0;
        record.in_post_dummy_planes = 0;
        record.out_pre_dummy_planes = 0;
        record.out_post_dummy_planes = 0;
        record.in_column_bytes = 0;
        record.in_plane_bytes = 1;
        record.out_column_bytes = 0;
        record.out_plane_bytes = 1;
    }
}

/// Image geometry copied into the record before Prepare.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    image_size: Point,
    planes: i16,
    filter_rect: Rect,
    horizontal_resolution: Fixed,
    vertical_resolution: Fixed,
    whole_size: Point,
    is_floating: bool,
}

impl Geometry {
    fn of(host: &dyn FilterHost) -> Self {
        let bounds = host.mask_bounds();
        let (horizontal, vertical) = host.resolution();
        let (image_width, image_height) = host.image_size();
        let planes = host.pixel_format().bytes_per_pixel();
        Self {
            image_size: point(host.width(), host.height()),
            planes: i16::try_from(planes).unwrap_or(i16::MAX),
            filter_rect: Rect::new(
                clamp_i16(bounds.y),
                clamp_i16(bounds.x),
                clamp_i16(bounds.bottom()),
                clamp_i16(bounds.right()),
            ),
            horizontal_resolution: long_to_fixed(whole_dpi(horizontal)),
            vertical_resolution: long_to_fixed(whole_dpi(vertical)),
            whole_size: point(image_width, image_height),
            is_floating: host.is_floating(),
        }
    }

    fn apply(self, record: &mut FilterRecord) {
        record.image_size = self.image_size;
        record.planes = self.planes;
        record.filter_rect = self.filter_rect;
        record.image_h_res = self.horizontal_resolution;
        record.image_v_res = self.vertical_resolution;
        record.float_coord = Point {
            v: self.filter_rect.top,
            h: self.filter_rect.left,
        };
        record.whole_size = self.whole_size;
        record.is_floating = u8::from(self.is_floating);
        record.have_mask = 0;
        record.auto_mask = 0;
        record.mask_data = ptr::null_mut();
        record.mask_row_bytes = 0;
    }
}

fn requests_pending(record: &FilterRecord) -> bool {
    let in_rect = record.in_rect;
    let out_rect = record.out_rect;
    let mask_rect = record.mask_rect;
    !in_rect.is_empty() || !out_rect.is_empty() || (record.have_mask != 0 && !mask_rect.is_empty())
}

fn decode_failure(code: i16) -> PluginFailure {
    match PluginOutcome::decode(code, || None) {
        PluginOutcome::Failed(failure) => failure,
        PluginOutcome::Success | PluginOutcome::Cancelled => PluginFailure::Other(code),
    }
}

fn point(horizontal: u32, vertical: u32) -> Point {
    Point {
        v: clamp_i16(vertical),
        h: clamp_i16(horizontal),
    }
}

fn clamp_i16(value: u32) -> i16 {
    i16::try_from(value).unwrap_or(i16::MAX)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is rounded and clamped to the fixed-point integer range first"
)]
fn whole_dpi(resolution: f64) -> i32 {
    resolution.round().clamp(0.0, f64::from(i16::MAX)) as i32
}

#[cfg(test)]
mod tests;
