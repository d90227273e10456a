//! Relocatable memory handles handed to plugins.
//!
//! The arena owns every handle allocated through the handle suite. A handle
//! value points at an [`ArenaHeader`] whose first field is the data pointer,
//! so plugins that dereference the handle directly still find their bytes.
//! Resizing updates the header in place and never changes the handle value.
//!
//! Values the arena did not allocate are classified by probing them as
//! native handles, first directly and then through one level of
//! indirection. Values that fail every probe are treated as garbage: size
//! and lock report zero and null, dispose and unlock do nothing.

mod native;

use std::collections::HashMap;
use std::ptr::{self, NonNull};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::abi::Handle;

pub use self::native::{NativeMemory, NoNativeMemory, platform_memory};
#[cfg(windows)]
pub use self::native::GlobalMemory;

/// Block a handle value points at.
#[repr(C)]
#[derive(Debug)]
pub struct ArenaHeader {
    /// Start of the handle's data.
    pub pointer: *mut u8,
    /// Length of the handle's data in bytes.
    pub size: usize,
}

/// What a raw handle value turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleClass {
    /// Not a handle this host can interpret.
    Unknown,
    /// Allocated by this arena.
    ArenaTracked,
    /// A native handle passed directly.
    NativeHandle(usize),
    /// A pointer to a cell holding the native handle.
    NativeHandlePointer(usize),
}

/// Storage form of a saved parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleRepresentation {
    /// Arena handle.
    Arena,
    /// Native handle.
    Native,
    /// Pointer to a native handle.
    NativePointer,
}

/// Failures of handle operations that must be reported to the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// The value is not a recognised handle.
    #[error("{address:#x} is not a handle")]
    Invalid {
        /// Raw handle value.
        address: usize,
    },
    /// The native block could not be resized in place.
    #[error("native handle {address:#x} could not be resized")]
    Resize {
        /// Raw handle value.
        address: usize,
    },
}

struct Allocation {
    header: NonNull<ArenaHeader>,
    data: Vec<u8>,
}

impl Allocation {
    fn new(size: usize) -> Self {
        let mut data = vec![0_u8; size];
        let header = Box::new(ArenaHeader {
            pointer: data.as_mut_ptr(),
            size,
        });
        Self {
            header: NonNull::from(Box::leak(header)),
            data,
        }
    }

    fn resize(&mut self, size: usize) {
        self.data.resize(size, 0);
        let pointer = self.data.as_mut_ptr();
        // SAFETY: the header was leaked from a box owned by this allocation
        // and is only freed in `drop`.
        unsafe {
            self.header.as_ptr().write(ArenaHeader { pointer, size });
        }
    }

    const fn handle(&self) -> Handle {
        self.header.as_ptr().cast()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: the header came from `Box::leak` and is dropped exactly once.
        drop(unsafe { Box::from_raw(self.header.as_ptr()) });
    }
}

/// Owner of every handle allocated during one invocation.
pub struct HandleArena {
    allocations: HashMap<usize, Allocation>,
    cells: Vec<NonNull<usize>>,
    native: Box<dyn NativeMemory>,
}

impl std::fmt::Debug for HandleArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleArena")
            .field("allocations", &self.allocations.len())
            .field("cells", &self.cells.len())
            .finish_non_exhaustive()
    }
}

impl Drop for HandleArena {
    fn drop(&mut self) {
        for cell in self.cells.drain(..) {
            // SAFETY: each cell came from `Box::leak` in `restore` and is
            // freed exactly once. The native block it names is left to the
            // plugin and the OS.
            drop(unsafe { Box::from_raw(cell.as_ptr()) });
        }
    }
}

impl Default for HandleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleArena {
    /// Creates an arena backed by the platform's native memory API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_native(platform_memory())
    }

    /// Creates an arena that probes foreign handles through `native`.
    #[must_use]
    pub fn with_native(native: Box<dyn NativeMemory>) -> Self {
        Self {
            allocations: HashMap::new(),
            cells: Vec::new(),
            native,
        }
    }

    /// Number of live arena handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns `true` when no arena handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Allocates a zeroed handle of `size` bytes.
    #[must_use]
    pub fn allocate(&mut self, size: usize) -> Handle {
        let allocation = Allocation::new(size);
        let handle = allocation.handle();
        trace!(?handle, size, "new handle");
        self.allocations.insert(handle.addr(), allocation);
        handle
    }

    /// Determines what `handle` refers to.
    ///
    /// This is the only place that dereferences foreign values, and it does
    /// so only after the native layer confirms the memory is readable.
    #[must_use]
    pub fn classify(&self, handle: Handle) -> HandleClass {
        if handle.is_null() {
            return HandleClass::Unknown;
        }
        let address = handle.addr();
        if self.allocations.contains_key(&address) {
            return HandleClass::ArenaTracked;
        }
        if self.native.size(address).is_some() {
            return HandleClass::NativeHandle(address);
        }
        if self.native.is_readable(address, size_of::<usize>()) {
            // SAFETY: the native layer reported the cell as readable.
            let inner = unsafe { handle.cast::<usize>().read_unaligned() };
            if self.native.size(inner).is_some() {
                return HandleClass::NativeHandlePointer(inner);
            }
        }
        HandleClass::Unknown
    }

    /// Frees a handle of any recognised kind.
    pub fn dispose(&mut self, handle: Handle) {
        match self.classify(handle) {
            HandleClass::ArenaTracked => {
                self.allocations.remove(&handle.addr());
            }
            HandleClass::NativeHandle(native) | HandleClass::NativeHandlePointer(native) => {
                self.native.free(native);
            }
            HandleClass::Unknown => debug!(?handle, "dispose of unknown handle ignored"),
        }
    }

    /// Legacy alias of [`dispose`](Self::dispose).
    pub fn dispose_regular(&mut self, handle: Handle) {
        self.dispose(handle);
    }

    /// Size of the handle's data, or zero when unrecognised.
    #[must_use]
    pub fn size(&self, handle: Handle) -> usize {
        match self.classify(handle) {
            HandleClass::ArenaTracked => self
                .allocations
                .get(&handle.addr())
                .map_or(0, |allocation| allocation.data.len()),
            HandleClass::NativeHandle(native) | HandleClass::NativeHandlePointer(native) => {
                self.native.size(native).unwrap_or(0)
            }
            HandleClass::Unknown => {
                debug!(?handle, "size of unknown handle");
                0
            }
        }
    }

    /// Resizes the handle, keeping its value stable.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Invalid`] for unrecognised values and
    /// [`HandleError::Resize`] when a native block moves or cannot grow.
    pub fn set_size(&mut self, handle: Handle, size: usize) -> Result<(), HandleError> {
        let address = handle.addr();
        match self.classify(handle) {
            HandleClass::ArenaTracked => {
                if let Some(allocation) = self.allocations.get_mut(&address) {
                    allocation.resize(size);
                }
                Ok(())
            }
            HandleClass::NativeHandle(native) => match self.native.realloc(native, size) {
                Some(resized) if resized == native => Ok(()),
                _ => Err(HandleError::Resize { address }),
            },
            HandleClass::NativeHandlePointer(native) => {
                let resized = self
                    .native
                    .realloc(native, size)
                    .ok_or(HandleError::Resize { address })?;
                // SAFETY: classification read this cell, so it is readable;
                // the plugin owns it as writable handle storage.
                unsafe { handle.cast::<usize>().write_unaligned(resized) };
                Ok(())
            }
            HandleClass::Unknown => Err(HandleError::Invalid { address }),
        }
    }

    /// Locks the handle and returns its data pointer, or null.
    #[must_use]
    pub fn lock(&self, handle: Handle) -> *mut u8 {
        match self.classify(handle) {
            HandleClass::ArenaTracked => self
                .allocations
                .get(&handle.addr())
                // SAFETY: the header lives as long as its allocation.
                .map_or(ptr::null_mut(), |allocation| unsafe {
                    (*allocation.header.as_ptr()).pointer
                }),
            HandleClass::NativeHandle(native) | HandleClass::NativeHandlePointer(native) => {
                self.native.lock(native)
            }
            HandleClass::Unknown => {
                debug!(?handle, "lock of unknown handle");
                ptr::null_mut()
            }
        }
    }

    /// Releases a lock taken by [`lock`](Self::lock).
    pub fn unlock(&self, handle: Handle) {
        match self.classify(handle) {
            HandleClass::NativeHandle(native) | HandleClass::NativeHandlePointer(native) => {
                self.native.unlock(native);
            }
            HandleClass::ArenaTracked | HandleClass::Unknown => {}
        }
    }

    /// Advisory request to free memory; nothing to do.
    pub fn recover_space(&self, size: usize) {
        trace!(size, "recover space");
    }

    /// Copies a handle's bytes out together with its representation.
    ///
    /// Returns `None` for unrecognised or empty handles.
    #[must_use]
    pub fn snapshot(&self, handle: Handle) -> Option<(HandleRepresentation, Vec<u8>)> {
        self.contents(handle).filter(|(_, bytes)| !bytes.is_empty())
    }

    /// Copies a handle's bytes out, including zero bytes for empty handles.
    ///
    /// Returns `None` for unrecognised handles.
    #[must_use]
    pub fn contents(&self, handle: Handle) -> Option<(HandleRepresentation, Vec<u8>)> {
        let representation = match self.classify(handle) {
            HandleClass::ArenaTracked => HandleRepresentation::Arena,
            HandleClass::NativeHandle(_) => HandleRepresentation::Native,
            HandleClass::NativeHandlePointer(_) => HandleRepresentation::NativePointer,
            HandleClass::Unknown => return None,
        };
        let size = self.size(handle);
        if size == 0 {
            return Some((representation, Vec::new()));
        }
        let data = self.lock(handle);
        if data.is_null() {
            self.unlock(handle);
            return None;
        }
        // SAFETY: a locked handle exposes `size` readable bytes at `data`.
        let bytes = unsafe { std::slice::from_raw_parts(data, size) }.to_vec();
        self.unlock(handle);
        Some((representation, bytes))
    }

    /// Recreates a handle holding `bytes` in the requested representation.
    ///
    /// Native representations fall back to an arena handle when the
    /// platform cannot allocate native memory.
    #[must_use]
    pub fn restore(&mut self, representation: HandleRepresentation, bytes: &[u8]) -> Handle {
        match representation {
            HandleRepresentation::Native => {
                if let Some(native) = self.native_copy(bytes) {
                    return ptr::without_provenance_mut(native);
                }
            }
            HandleRepresentation::NativePointer => {
                if let Some(native) = self.native_copy(bytes) {
                    let cell = NonNull::from(Box::leak(Box::new(native)));
                    self.cells.push(cell);
                    return cell.as_ptr().cast();
                }
            }
            HandleRepresentation::Arena => {}
        }
        let handle = self.allocate(bytes.len());
        if let Some(allocation) = self.allocations.get_mut(&handle.addr()) {
            allocation.data.copy_from_slice(bytes);
            allocation.resize(bytes.len());
        }
        handle
    }

    fn native_copy(&self, bytes: &[u8]) -> Option<usize> {
        let native = self.native.alloc(bytes.len())?;
        let data = self.native.lock(native);
        if data.is_null() {
            self.native.free(native);
            return None;
        }
        // SAFETY: a freshly allocated block of `bytes.len()` bytes is locked
        // at `data` and cannot overlap `bytes`.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len()) };
        self.native.unlock(native);
        Some(native)
    }
}
