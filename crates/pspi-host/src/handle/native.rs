//! Access to operating-system relocatable memory blocks.
//!
//! Plugins built for the legacy interface sometimes hand back handles they
//! allocated themselves with the OS global-memory API instead of the
//! handle suite. [`NativeMemory`] is the seam through which the arena
//! probes and manipulates such blocks.

/// Operations on native relocatable memory handles.
///
/// Values are raw handle integers. Implementations must tolerate arbitrary
/// values: probing a garbage handle reports `None` or `false` rather than
/// faulting.
pub trait NativeMemory {
    /// Size of the block behind `handle`, or `None` when the value is not a
    /// live native handle.
    fn size(&self, handle: usize) -> Option<usize>;

    /// Locks the block and returns its address.
    fn lock(&self, handle: usize) -> *mut u8;

    /// Releases one lock taken by [`lock`](Self::lock).
    fn unlock(&self, handle: usize);

    /// Frees the block.
    fn free(&self, handle: usize);

    /// Allocates a movable block of `size` bytes.
    fn alloc(&self, size: usize) -> Option<usize>;

    /// Resizes the block, returning the handle that now identifies it.
    fn realloc(&self, handle: usize, size: usize) -> Option<usize>;

    /// Returns `true` when `len` bytes at `address` may be read.
    fn is_readable(&self, address: usize, len: usize) -> bool;
}

/// Stand-in for platforms without a global-memory API.
///
/// Every probe fails, so only arena handles are ever recognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeMemory;

impl NativeMemory for NoNativeMemory {
    fn size(&self, _handle: usize) -> Option<usize> {
        None
    }

    fn lock(&self, _handle: usize) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn unlock(&self, _handle: usize) {}

    fn free(&self, _handle: usize) {}

    fn alloc(&self, _size: usize) -> Option<usize> {
        None
    }

    fn realloc(&self, _handle: usize, _size: usize) -> Option<usize> {
        None
    }

    fn is_readable(&self, _address: usize, _len: usize) -> bool {
        false
    }
}

#[cfg(windows)]
pub use self::global::GlobalMemory;

#[cfg(windows)]
mod global {
    use windows_sys::Win32::System::Memory::{
        GMEM_MOVEABLE, GlobalAlloc, GlobalFree, GlobalLock, GlobalReAlloc, GlobalSize,
        GlobalUnlock, IsBadReadPtr,
    };

    use super::NativeMemory;

    /// The Win32 global-memory API.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct GlobalMemory;

    #[expect(
        clippy::cast_possible_wrap,
        reason = "HGLOBAL is an isize carrying a pointer-sized handle"
    )]
    const fn hglobal(handle: usize) -> isize {
        handle as isize
    }

    #[expect(
        clippy::cast_sign_loss,
        reason = "HGLOBAL is an isize carrying a pointer-sized handle"
    )]
    const fn raw(handle: isize) -> usize {
        handle as usize
    }

    impl NativeMemory for GlobalMemory {
        fn size(&self, handle: usize) -> Option<usize> {
            if handle == 0 {
                return None;
            }
            // SAFETY: GlobalSize validates the handle and returns zero for
            // values that do not name a global block.
            let size = unsafe { GlobalSize(hglobal(handle)) };
            (size > 0).then_some(size)
        }

        fn lock(&self, handle: usize) -> *mut u8 {
            // SAFETY: callers only lock handles that `size` accepted.
            unsafe { GlobalLock(hglobal(handle)) }.cast()
        }

        fn unlock(&self, handle: usize) {
            // SAFETY: callers only unlock handles that `size` accepted.
            unsafe { GlobalUnlock(hglobal(handle)) };
        }

        fn free(&self, handle: usize) {
            // SAFETY: callers only free handles that `size` accepted.
            unsafe { GlobalFree(hglobal(handle)) };
        }

        fn alloc(&self, size: usize) -> Option<usize> {
            // SAFETY: GlobalAlloc has no preconditions beyond valid flags.
            let handle = unsafe { GlobalAlloc(GMEM_MOVEABLE, size) };
            (handle != 0).then(|| raw(handle))
        }

        fn realloc(&self, handle: usize, size: usize) -> Option<usize> {
            // SAFETY: callers only resize handles that `size` accepted.
            let resized = unsafe { GlobalReAlloc(hglobal(handle), size, 0) };
            (resized != 0).then(|| raw(resized))
        }

        fn is_readable(&self, address: usize, len: usize) -> bool {
            // SAFETY: IsBadReadPtr probes the range under a structured
            // exception handler and never faults the caller.
            unsafe { IsBadReadPtr(address as *const core::ffi::c_void, len) == 0 }
        }
    }
}

/// Native memory implementation for the current platform.
#[must_use]
pub fn platform_memory() -> Box<dyn NativeMemory> {
    #[cfg(windows)]
    {
        Box::new(GlobalMemory)
    }
    #[cfg(not(windows))]
    {
        Box::new(NoNativeMemory)
    }
}
