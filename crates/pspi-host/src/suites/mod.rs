//! Callback suites handed to every module through the filter record.
//!
//! The tables hold nothing but function pointers and version numbers, so
//! one process-wide copy is built on first use and shared by every
//! invocation. Each callback looks up the active
//! [`InvocationContext`](crate::context::InvocationContext) for its state.
//! Traffic is logged at `trace` under each suite's module path, so
//! `pspi_host::suites::handles=trace` follows handle use only.

mod basic;
mod buffer;
mod handles;
mod misc;
mod properties;
mod resources;
mod services;

use std::collections::HashMap;
use std::ffi::c_void;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::abi::{
    BufferProcs, FilterRecord, HandleProcs, ImageServicesProcs, OsErr, PropertyProcs,
    ResourceProcs, SpBasicSuite, codes,
};

const BUFFER_PROCS_VERSION: i16 = 2;
const BUFFER_PROCS_COUNT: i16 = 5;
const HANDLE_PROCS_VERSION: i16 = 1;
const HANDLE_PROCS_COUNT: i16 = 8;
const RESOURCE_PROCS_VERSION: i16 = 3;
const RESOURCE_PROCS_COUNT: i16 = 4;
const PROPERTY_PROCS_VERSION: i16 = 1;
const PROPERTY_PROCS_COUNT: i16 = 2;
const IMAGE_SERVICES_PROCS_VERSION: i16 = 1;
const IMAGE_SERVICES_PROCS_COUNT: i16 = 4;

/// Result of a callback made while no entry-point call is in progress.
const NO_CONTEXT: OsErr = codes::ERR_PLUG_IN_HOST_INSUFFICIENT;

static TABLES: OnceCell<SuiteTables> = OnceCell::new();

/// The versioned callback tables.
pub struct SuiteTables {
    /// Buffer allocation.
    pub buffer: BufferProcs,
    /// Handle management.
    pub handle: HandleProcs,
    /// Image resources.
    pub resource: ResourceProcs,
    /// Host properties.
    pub property: PropertyProcs,
    /// Interpolation, always failing.
    pub image_services: ImageServicesProcs,
    /// Basic extension suite.
    pub basic: SpBasicSuite,
}

impl std::fmt::Debug for SuiteTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.buffer.version;
        let handle = self.handle.version;
        let resource = self.resource.version;
        let property = self.property.version;
        let image_services = self.image_services.version;
        f.debug_struct("SuiteTables")
            .field("buffer", &buffer)
            .field("handle", &handle)
            .field("resource", &resource)
            .field("property", &property)
            .field("image_services", &image_services)
            .finish_non_exhaustive()
    }
}

impl SuiteTables {
    fn build() -> Self {
        Self {
            buffer: BufferProcs {
                version: BUFFER_PROCS_VERSION,
                count: BUFFER_PROCS_COUNT,
                allocate: Some(buffer::allocate),
                lock: Some(buffer::lock),
                unlock: Some(buffer::unlock),
                free: Some(buffer::free),
                space: Some(buffer::space),
            },
            handle: HandleProcs {
                version: HANDLE_PROCS_VERSION,
                count: HANDLE_PROCS_COUNT,
                new: Some(handles::new),
                dispose: Some(handles::dispose),
                get_size: Some(handles::get_size),
                set_size: Some(handles::set_size),
                lock: Some(handles::lock),
                unlock: Some(handles::unlock),
                recover_space: Some(handles::recover_space),
                dispose_regular: Some(handles::dispose_regular),
            },
            resource: ResourceProcs {
                version: RESOURCE_PROCS_VERSION,
                count: RESOURCE_PROCS_COUNT,
                count_proc: Some(resources::count),
                get: Some(resources::get),
                delete: Some(resources::delete),
                add: Some(resources::add),
            },
            property: PropertyProcs {
                version: PROPERTY_PROCS_VERSION,
                count: PROPERTY_PROCS_COUNT,
                get: Some(properties::get),
                set: Some(properties::set),
            },
            image_services: ImageServicesProcs {
                version: IMAGE_SERVICES_PROCS_VERSION,
                count: IMAGE_SERVICES_PROCS_COUNT,
                interpolate_1d: Some(services::interpolate),
                interpolate_2d: Some(services::interpolate),
                interpolate_1d_multi: Some(services::interpolate),
                interpolate_2d_multi: Some(services::interpolate),
            },
            basic: SpBasicSuite {
                acquire_suite: Some(basic::acquire_suite),
                release_suite: Some(basic::release_suite),
                is_equal: Some(basic::is_equal),
                allocate_block: Some(basic::allocate_block),
                free_block: Some(basic::free_block),
                reallocate_block: Some(basic::reallocate_block),
                undefined: Some(basic::undefined),
            },
        }
    }
}

/// Returns the process-wide tables, building them on first use.
///
/// Later calls return the same tables.
#[must_use]
pub fn tables() -> &'static SuiteTables {
    TABLES.get_or_init(|| {
        debug!("building callback suites");
        SuiteTables::build()
    })
}

/// Points every suite and callback field of `record` at `tables`.
pub fn install_record(record: &mut FilterRecord, tables: &'static SuiteTables) {
    record.buffer_procs = &raw const tables.buffer;
    record.handle_procs = &raw const tables.handle;
    record.resource_procs = &raw const tables.resource;
    record.property_procs = &raw const tables.property;
    record.image_services_procs = &raw const tables.image_services;
    record.sp_basic = &raw const tables.basic;
    record.get_property_obsolete = tables.property.get;
    record.abort_proc = Some(misc::test_abort);
    record.progress_proc = Some(misc::update_progress);
    record.host_proc = Some(misc::host_proc);
    record.process_event = Some(misc::process_event);
    record.display_pixels = Some(misc::display_pixels);
    record.advance_state = Some(misc::advance_state);
    record.color_services = Some(services::color_services);
}

/// Byte blocks whose addresses are handed out as opaque identifiers.
#[derive(Debug, Default)]
pub struct BlockPool {
    blocks: HashMap<usize, Vec<u8>>,
}

impl BlockPool {
    /// Allocates a zeroed block of at least one byte.
    pub fn allocate(&mut self, size: usize) -> *mut c_void {
        let mut block = vec![0; size.max(1)];
        let address = block.as_mut_ptr();
        self.blocks.insert(address.addr(), block);
        address.cast()
    }

    /// Returns `true` when `block` came from this pool and is live.
    #[must_use]
    pub fn contains(&self, block: *const c_void) -> bool {
        self.blocks.contains_key(&block.addr())
    }

    /// Size of a live block.
    #[must_use]
    pub fn size(&self, block: *const c_void) -> Option<usize> {
        self.blocks.get(&block.addr()).map(Vec::len)
    }

    /// Releases `block`, returning `false` when it is unknown.
    pub fn free(&mut self, block: *const c_void) -> bool {
        self.blocks.remove(&block.addr()).is_some()
    }

    /// Resizes `block`, which may move; a null `block` allocates.
    ///
    /// Returns `None` for blocks this pool did not hand out.
    pub fn reallocate(&mut self, block: *mut c_void, size: usize) -> Option<*mut c_void> {
        if block.is_null() {
            return Some(self.allocate(size));
        }
        let mut data = self.blocks.remove(&block.addr())?;
        data.resize(size.max(1), 0);
        let address = data.as_mut_ptr();
        self.blocks.insert(address.addr(), data);
        Some(address.cast())
    }

    /// Number of live blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` when no block is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn to_usize(size: i32) -> Option<usize> {
    usize::try_from(size).ok()
}

fn to_i32(size: usize) -> i32 {
    i32::try_from(size).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests;
