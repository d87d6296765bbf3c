use std::ptr::NonNull;

use crate::util::hint::cold;

/// The real allocator underneath a [`Tracer`](super::Tracer). The tracer calls
/// exactly one `allocate()` or `deallocate()` per request and never retries.
pub trait RawAllocator {
    /// Allocate `size` bytes, or `None` if the allocator is exhausted
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` must be null, or a pointer returned by `allocate()` on this
    /// allocator that has not been deallocated since. Same contract as
    /// `free()`.
    unsafe fn deallocate(&self, ptr: *mut u8);
}

/// `malloc()`/`free()` from the platform libc, without any metadata stored
#[derive(Clone, Copy, Debug, Default)]
pub struct LibcMalloc;

impl RawAllocator for LibcMalloc {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // `malloc(0)` may legitimately return null, which would read as
        // exhaustion
        let size = size.max(1);
        // SAFETY: `malloc()` has no preconditions
        let data = unsafe { libc::malloc(size) } as *mut u8;
        match NonNull::new(data) {
            Some(data) => Some(data),
            None => cold(|| None),
        }
    }

    unsafe fn deallocate(&self, ptr: *mut u8) {
        // SAFETY: identical contract to `free()`, passed on to the caller
        unsafe { libc::free(ptr as *mut libc::c_void) }
    }
}
