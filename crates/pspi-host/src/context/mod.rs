//! Per-invocation state shared between the state machine and callbacks.
//!
//! The legacy ABI gives callbacks no user-data parameter, so the context
//! that owns the filter record is published in a thread-local slot for the
//! duration of each entry-point call. Callback suites reach it through
//! [`with_active`]; outside a call they see no context and degrade to the
//! standard legacy error code.

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::ptr;

use tracing::debug;

use crate::abi::{AboutRecord, FilterRecord, OsErr, PlatformData, RgbColor, Selector, Str255};
use crate::abi::{BUFFER_SPACE, codes, tags};
use crate::filter::exchange::TileExchange;
use crate::handle::HandleArena;
use crate::host::FilterHost;
use crate::module::EntryPoint;
use crate::outcome::pascal_string;
use crate::suites::{self, BlockPool};

thread_local! {
    static ACTIVE: Cell<*mut c_void> = const { Cell::new(ptr::null_mut()) };
}

/// Everything one filter or about invocation owns.
///
/// The record, the platform data and the message buffer are boxed so the
/// addresses handed to the module stay fixed while the context moves.
pub struct InvocationContext<'h> {
    pub(crate) record: Box<FilterRecord>,
    about: Box<AboutRecord>,
    platform: Box<PlatformData>,
    error_string: Box<Str255>,
    data: Box<isize>,
    pub(crate) handles: HandleArena,
    pub(crate) buffers: BlockPool,
    pub(crate) blocks: BlockPool,
    pub(crate) exchange: TileExchange,
    host: Option<&'h mut dyn FilterHost>,
}

impl<'h> InvocationContext<'h> {
    /// Creates a context for a filter run against `host`.
    #[must_use]
    pub fn new(host: &'h mut dyn FilterHost, handles: HandleArena) -> Self {
        let mut context = Self::build(Some(host), handles);
        context.setup_filter_record();
        context
    }

    /// Creates a context with no drawable, used for about boxes.
    #[must_use]
    pub fn detached(handles: HandleArena) -> Self {
        Self::build(None, handles)
    }

    fn build(host: Option<&'h mut dyn FilterHost>, handles: HandleArena) -> Self {
        let mut context = Self {
            record: FilterRecord::zeroed(),
            about: Box::new(AboutRecord::zeroed()),
            platform: Box::default(),
            error_string: Box::new([0; 256]),
            data: Box::new(0),
            handles,
            buffers: BlockPool::default(),
            blocks: BlockPool::default(),
            exchange: TileExchange::default(),
            host,
        };
        let tables = suites::tables();
        let platform = ptr::from_mut::<PlatformData>(&mut context.platform).cast::<c_void>();
        context.about.platform_data = platform;
        context.about.sp_basic = &raw const tables.basic;
        context.about.plug_in_ref = ptr::null_mut();
        context.record.platform_data = platform;
        context.record.error_string = ptr::from_mut::<Str255>(&mut context.error_string);
        suites::install_record(&mut context.record, tables);
        context
    }

    fn setup_filter_record(&mut self) {
        let Some(host) = self.host.as_deref() else {
            return;
        };
        let background = host.background();
        let foreground = host.foreground();
        let (width, height) = host.tile_size();
        let tile_width = i16::try_from(width).unwrap_or(i16::MAX);
        let tile_height = i16::try_from(height).unwrap_or(i16::MAX);

        let record = &mut self.record;
        record.background = RgbColor::from_rgb8(background);
        record.foreground = RgbColor::from_rgb8(foreground);
        record.back_color = opaque(background);
        record.fore_color = opaque(foreground);
        record.max_space = BUFFER_SPACE;
        record.host_sig = u32::from_be_bytes(tags::HOST_SIGNATURE);
        record.dummy_plane_value = -1;
        record.supports_absolute = 1;
        record.depth = 8;
        record.in_tile_width = tile_width;
        record.in_tile_height = tile_height;
        record.abs_tile_width = tile_width;
        record.abs_tile_height = tile_height;
        record.out_tile_width = tile_width;
        record.out_tile_height = tile_height;
        record.mask_tile_width = tile_width;
        record.mask_tile_height = tile_height;
    }

    /// The filter record handed to the module.
    #[must_use]
    pub fn record(&self) -> &FilterRecord {
        &self.record
    }

    /// Mutable access to the filter record.
    pub fn record_mut(&mut self) -> &mut FilterRecord {
        &mut self.record
    }

    /// The module's scalar data token.
    #[must_use]
    pub fn data(&self) -> isize {
        *self.data
    }

    /// Replaces the data token.
    pub fn set_data(&mut self, data: isize) {
        *self.data = data;
    }

    /// Handles allocated for this invocation.
    #[must_use]
    pub const fn handles(&self) -> &HandleArena {
        &self.handles
    }

    /// Mutable access to the handle arena.
    pub const fn handles_mut(&mut self) -> &mut HandleArena {
        &mut self.handles
    }

    /// The host, absent for about invocations.
    pub fn host(&mut self) -> Option<&mut (dyn FilterHost + 'h)> {
        self.host.as_deref_mut()
    }

    /// The host for read-only queries.
    #[must_use]
    pub fn host_ref(&self) -> Option<&(dyn FilterHost + 'h)> {
        self.host.as_deref()
    }

    /// Message the module left in `errorString`, if any.
    #[must_use]
    pub fn reported_error(&self) -> Option<String> {
        pascal_string(self.error_string.as_slice()).filter(|message| !message.is_empty())
    }

    /// Calls `entry` with the filter record.
    pub fn call(&mut self, entry: &dyn EntryPoint, selector: Selector) -> OsErr {
        self.error_string.fill(0);
        self.dispatch(entry, selector, RecordKind::Filter)
    }

    /// Calls `entry` with the about record.
    pub fn call_about(&mut self, entry: &dyn EntryPoint) -> OsErr {
        self.dispatch(entry, Selector::About, RecordKind::About)
    }

    fn dispatch(&mut self, entry: &dyn EntryPoint, selector: Selector, kind: RecordKind) -> OsErr {
        debug!(%selector, "calling entry point");
        // The record, the data token and the callbacks' view of the context
        // all derive from this one pointer; `self` stays unused until the
        // call returns.
        let this = ptr::from_mut(self);
        // SAFETY: `this` comes from a live exclusive borrow, and the boxes it
        // reaches are owned by the context for the whole call.
        let (record, data) = unsafe {
            let record = match kind {
                RecordKind::Filter => (&raw mut *(*this).record).cast::<c_void>(),
                RecordKind::About => (&raw mut *(*this).about).cast::<c_void>(),
            };
            (record, &raw mut *(*this).data)
        };
        let _active = ActiveContext::enter(this);
        // SAFETY: `record` and `data` point into boxes owned by this context,
        // which outlives the call; callbacks reach the context only through
        // the active slot that the guard clears afterwards.
        let result = unsafe { entry.invoke(selector, record, data) };
        debug!(%selector, result, "entry point returned");
        result
    }

    /// Services the pending tile requests.
    pub fn advance(&mut self) -> OsErr {
        let Some(host) = self.host.as_deref_mut() else {
            return codes::ERR_PLUG_IN_HOST_INSUFFICIENT;
        };
        self.exchange.advance(&mut self.record, host)
    }

    /// Releases every exchange buffer without storing pending output.
    pub(crate) fn release_tiles(&mut self) {
        self.exchange.release(&mut self.record);
    }
}

/// Which record an entry-point call receives.
#[derive(Clone, Copy)]
enum RecordKind {
    Filter,
    About,
}

/// Appends an opaque alpha byte to an eight-bit colour.
const fn opaque([red, green, blue]: [u8; 3]) -> [u8; 4] {
    [red, green, blue, 0xFF]
}

impl fmt::Debug for InvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("data", &self.data)
            .field("handles", &self.handles)
            .field("has_host", &self.host.is_some())
            .finish_non_exhaustive()
    }
}

/// Publishes a context to callbacks until dropped.
struct ActiveContext {
    previous: *mut c_void,
}

impl ActiveContext {
    fn enter(context: *mut InvocationContext<'_>) -> Self {
        let current = context.cast::<c_void>();
        let previous = ACTIVE.with(|slot| slot.replace(current));
        Self { previous }
    }
}

impl Drop for ActiveContext {
    fn drop(&mut self) {
        ACTIVE.with(|slot| slot.set(self.previous));
    }
}

/// Runs `f` against the context of the entry-point call in progress.
///
/// Returns `fallback` when no call is in progress on this thread.
pub(crate) fn with_active<R>(fallback: R, f: impl FnOnce(&mut InvocationContext<'_>) -> R) -> R {
    let active = ACTIVE.with(Cell::get);
    if active.is_null() {
        return fallback;
    }
    // SAFETY: the slot only holds a pointer while `dispatch` keeps the
    // context alive, and the module calls back on the dispatching thread
    // while the dispatching frame is suspended in the call.
    let context = unsafe { &mut *active.cast::<InvocationContext<'_>>() };
    f(context)
}

/// Returns `true` while an entry-point call is in progress on this thread.
#[must_use]
pub fn is_active() -> bool {
    !ACTIVE.with(Cell::get).is_null()
}

#[cfg(test)]
mod tests;
