//! Filter entry points written in Rust that behave like native modules.
//!
//! They see exactly what a native module sees: a raw filter record whose
//! callback tables lead back into the host.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;
use std::rc::Rc;

use crate::abi::{FilterRecord, Handle, HandleProcs, OsErr, Rect, Selector, codes};
use crate::error::PluginError;
use crate::module::{EntryPoint, ModuleLoader};

/// What an entry saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Observation {
    pub(crate) selector: Selector,
    pub(crate) image_mode: i16,
    pub(crate) planes: i16,
    pub(crate) layer_planes: i16,
    pub(crate) transparency_mask: i16,
    pub(crate) filter_rect: Rect,
    pub(crate) parameters: Option<Vec<u8>>,
    pub(crate) data: isize,
}

impl Observation {
    fn about() -> Self {
        Self {
            selector: Selector::About,
            image_mode: 0,
            planes: 0,
            layer_planes: 0,
            transparency_mask: 0,
            filter_rect: Rect::default(),
            parameters: None,
            data: 0,
        }
    }

    fn of(selector: Selector, record: &FilterRecord, data: isize) -> Self {
        Self {
            selector,
            image_mode: record.image_mode,
            planes: record.planes,
            layer_planes: record.in_layer_planes,
            transparency_mask: record.in_transparency_mask,
            filter_rect: record.filter_rect,
            parameters: read_handle(record, record.parameters),
            data,
        }
    }
}

/// An entry point that follows a script and records every call.
#[derive(Default)]
pub(crate) struct ScriptedEntry {
    results: HashMap<Selector, OsErr>,
    message: Option<String>,
    chosen: Option<(Vec<u8>, isize)>,
    request: Option<Rect>,
    seen: RefCell<Vec<Observation>>,
}

impl ScriptedEntry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `code` whenever `selector` is called.
    pub(crate) fn returning(mut self, selector: Selector, code: OsErr) -> Self {
        self.results.insert(selector, code);
        self
    }

    /// Message written to the record when a report-string code is returned.
    pub(crate) fn reporting(mut self, message: &str) -> Self {
        self.message = Some(message.to_owned());
        self
    }

    /// Parameters and data token chosen during Parameters.
    pub(crate) fn choosing(mut self, parameters: &[u8], data: isize) -> Self {
        self.chosen = Some((parameters.to_vec(), data));
        self
    }

    /// Tile requested at Start and dropped at the first Continue.
    pub(crate) fn requesting(mut self, rect: Rect) -> Self {
        self.request = Some(rect);
        self
    }

    pub(crate) fn selectors(&self) -> Vec<Selector> {
        self.seen.borrow().iter().map(|seen| seen.selector).collect()
    }

    pub(crate) fn observed(&self, selector: Selector) -> Option<Observation> {
        self.seen
            .borrow()
            .iter()
            .find(|seen| seen.selector == selector)
            .cloned()
    }

    fn result(&self, selector: Selector) -> OsErr {
        self.results.get(&selector).copied().unwrap_or(codes::NO_ERR)
    }
}

impl EntryPoint for ScriptedEntry {
    unsafe fn invoke(&self, selector: Selector, raw: *mut c_void, data: *mut isize) -> OsErr {
        let code = self.result(selector);
        if selector == Selector::About {
            self.seen.borrow_mut().push(Observation::about());
            return code;
        }
        // SAFETY: filter selectors receive the live filter record.
        let record = unsafe { &mut *raw.cast::<FilterRecord>() };
        // SAFETY: the data token outlives the call.
        let token = unsafe { &mut *data };
        self.seen
            .borrow_mut()
            .push(Observation::of(selector, record, *token));

        if code == codes::ERR_REPORT_STRING {
            if let Some(message) = &self.message {
                report(record, message);
            }
        }
        if code != codes::NO_ERR {
            return code;
        }
        match selector {
            Selector::Parameters => {
                if let Some((bytes, value)) = &self.chosen {
                    record.parameters = new_handle(record, bytes);
                    *token = *value;
                }
            }
            Selector::Start => {
                if let Some(rect) = self.request {
                    let last = record.planes - 1;
                    record.in_rect = rect;
                    record.out_rect = rect;
                    record.in_lo_plane = 0;
                    record.in_hi_plane = last;
                    record.out_lo_plane = 0;
                    record.out_hi_plane = last;
                }
            }
            Selector::Continue => {
                record.in_rect = Rect::default();
                record.out_rect = Rect::default();
            }
            _ => {}
        }
        code
    }
}

/// Inverts the colour planes of the filter rectangle in bands of rows.
pub(crate) struct InvertEntry {
    band: i16,
    next_top: Cell<i16>,
    calls: RefCell<Vec<Selector>>,
}

impl InvertEntry {
    pub(crate) const fn new(band: i16) -> Self {
        Self {
            band,
            next_top: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn selectors(&self) -> Vec<Selector> {
        self.calls.borrow().clone()
    }

    fn request_band(&self, record: &mut FilterRecord) {
        let filter = record.filter_rect;
        let top = self.next_top.get();
        if top >= filter.bottom {
            record.in_rect = Rect::default();
            record.out_rect = Rect::default();
            return;
        }
        let band = Rect::new(top, filter.left, (top + self.band).min(filter.bottom), filter.right);
        let last = record.in_layer_planes - 1;
        record.in_rect = band;
        record.out_rect = band;
        record.in_lo_plane = 0;
        record.in_hi_plane = last;
        record.out_lo_plane = 0;
        record.out_hi_plane = last;
        self.next_top.set(band.bottom);
    }
}

impl EntryPoint for InvertEntry {
    unsafe fn invoke(&self, selector: Selector, raw: *mut c_void, _data: *mut isize) -> OsErr {
        self.calls.borrow_mut().push(selector);
        if selector == Selector::About {
            return codes::NO_ERR;
        }
        // SAFETY: filter selectors receive the live filter record.
        let record = unsafe { &mut *raw.cast::<FilterRecord>() };
        match selector {
            Selector::Start => {
                self.next_top.set(record.filter_rect.top);
                self.request_band(record);
            }
            Selector::Continue => {
                let in_rect = record.in_rect;
                let row = in_rect.width() * usize::try_from(record.in_layer_planes).unwrap_or(0);
                let length = row * in_rect.height();
                let (in_data, out_data) = (record.in_data, record.out_data);
                let input = in_data.cast::<u8>();
                let output = out_data.cast::<u8>();
                if input.is_null() || output.is_null() {
                    return codes::FILTER_BAD_PARAMETERS;
                }
                // SAFETY: the host lends buffers of `row * height` bytes for
                // the rectangles requested last.
                let (source, target) = unsafe {
                    (
                        std::slice::from_raw_parts(input, length),
                        std::slice::from_raw_parts_mut(output, length),
                    )
                };
                for (out, value) in target.iter_mut().zip(source) {
                    *out = 255 - value;
                }
                self.request_band(record);
            }
            _ => {}
        }
        codes::NO_ERR
    }
}

/// Hands out shared entry points by symbol.
#[derive(Clone, Default)]
pub(crate) struct FakeLoader {
    entries: HashMap<String, Rc<dyn EntryPoint>>,
    loads: Rc<RefCell<Vec<(PathBuf, String)>>>,
}

impl FakeLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, symbol: &str, entry: Rc<dyn EntryPoint>) -> Self {
        self.entries.insert(symbol.to_owned(), entry);
        self
    }

    pub(crate) fn loads(&self) -> Vec<(PathBuf, String)> {
        self.loads.borrow().clone()
    }
}

impl ModuleLoader for FakeLoader {
    fn entry_point(&self, path: &Path, symbol: &str) -> Result<Box<dyn EntryPoint>, PluginError> {
        self.loads
            .borrow_mut()
            .push((path.to_path_buf(), symbol.to_owned()));
        let entry = self
            .entries
            .get(symbol)
            .ok_or_else(|| PluginError::EntrySymbolUnresolvable {
                path: path.to_path_buf(),
                symbol: symbol.to_owned(),
            })?;
        Ok(Box::new(Shared(Rc::clone(entry))))
    }
}

struct Shared(Rc<dyn EntryPoint>);

impl EntryPoint for Shared {
    unsafe fn invoke(&self, selector: Selector, record: *mut c_void, data: *mut isize) -> OsErr {
        // SAFETY: the caller's contract is passed through unchanged.
        unsafe { self.0.invoke(selector, record, data) }
    }
}

fn handle_procs(record: &FilterRecord) -> HandleProcs {
    let procs = record.handle_procs;
    assert!(!procs.is_null(), "handle suite installed");
    // SAFETY: the host points the record at its static handle suite.
    unsafe { procs.read_unaligned() }
}

/// Allocates a handle through the record's handle suite and fills it.
pub(crate) fn new_handle(record: &FilterRecord, bytes: &[u8]) -> Handle {
    let procs = handle_procs(record);
    let (Some(new), Some(lock), Some(unlock)) = (procs.new, procs.lock, procs.unlock) else {
        panic!("handle suite is complete");
    };
    let size = i32::try_from(bytes.len()).expect("small handle");
    // SAFETY: suite procedures are called as a module would call them.
    unsafe {
        let handle = new(size);
        let data = lock(handle, 0).cast::<u8>();
        ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
        unlock(handle);
        handle
    }
}

/// Reads a handle's contents through the record's handle suite.
pub(crate) fn read_handle(record: &FilterRecord, handle: Handle) -> Option<Vec<u8>> {
    if handle.is_null() {
        return None;
    }
    let procs = handle_procs(record);
    let (Some(get_size), Some(lock), Some(unlock)) = (procs.get_size, procs.lock, procs.unlock)
    else {
        panic!("handle suite is complete");
    };
    // SAFETY: suite procedures are called as a module would call them.
    unsafe {
        let size = usize::try_from(get_size(handle)).ok()?;
        let data = lock(handle, 0).cast::<u8>();
        if data.is_null() {
            return None;
        }
        let bytes = std::slice::from_raw_parts(data, size).to_vec();
        unlock(handle);
        Some(bytes)
    }
}

fn report(record: &FilterRecord, message: &str) {
    let target = record.error_string;
    if target.is_null() {
        return;
    }
    let bytes = message.as_bytes();
    let length = bytes.len().min(255);
    // SAFETY: the host supplies a 256-byte Pascal string buffer.
    let buffer = unsafe { &mut *target };
    buffer[0] = u8::try_from(length).expect("at most 255");
    buffer[1..=length].copy_from_slice(&bytes[..length]);
}
