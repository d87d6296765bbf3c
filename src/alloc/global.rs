//! A process-wide tracer for code that cannot pass a [`Tracer`] around.
//!
//! It is built on first use from [`TracerConfig::from_env()`] and lives until
//! the process exits. Every access goes through one mutex.

use std::{
    ptr::NonNull,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::debug;
use once_cell::sync::Lazy;

use crate::{config::TracerConfig, error::TraceError};

use super::{manual::LibcMalloc, site::CallSite, tracing::Tracer};

static GLOBAL: Lazy<Mutex<Tracer<LibcMalloc>>> = Lazy::new(|| {
    let config = TracerConfig::from_env();
    debug!(
        "global tracer: {} buckets, {:?} address keys",
        config.bucket_count, config.address_key
    );
    Mutex::new(Tracer::with_config(LibcMalloc, &config))
});

/// Lock the process-wide tracer.
///
/// A panic while the lock was held does not make the tracer unusable: every
/// map operation either completes or leaves the map as it was, so the lock is
/// taken over from a poisoned mutex.
pub fn global() -> MutexGuard<'static, Tracer<LibcMalloc>> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `malloc()` through the global tracer. Prefer [`trace_malloc!`](crate::trace_malloc).
pub fn trace_malloc(size: usize, site: &CallSite<'_>) -> Result<NonNull<u8>, TraceError> {
    global().on_allocate(size, site)
}

/// `free()` through the global tracer. Prefer [`trace_free!`](crate::trace_free).
///
/// # Safety
///
/// `ptr` must be null, or a live pointer from [`trace_malloc()`].
pub unsafe fn trace_free(ptr: *mut u8, site: &CallSite<'_>) -> Result<(), TraceError> {
    // SAFETY: requirement passed to caller
    unsafe { global().on_release(ptr, site) }
}

/// Allocate `size` bytes through the global tracer, recorded against the
/// calling line.
#[macro_export]
macro_rules! trace_malloc {
    ($size:expr) => {
        $crate::alloc::global::trace_malloc($size, &$crate::call_site!())
    };
}

/// Release a pointer from [`trace_malloc!`] through the global tracer.
///
/// Expands to an `unsafe` call, see [`trace_free()`](crate::alloc::global::trace_free).
#[macro_export]
macro_rules! trace_free {
    ($ptr:expr) => {
        $crate::alloc::global::trace_free($ptr, &$crate::call_site!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other tests may use the global tracer concurrently, so only look at
    // what this test's own sites and addresses did.

    #[test]
    fn macros_go_through_the_global_tracer() {
        let ptr = crate::trace_malloc!(24).unwrap();
        let owner = global().provenance(ptr.as_ptr()).unwrap().site.clone();
        assert!(owner.ends_with("macros_go_through_the_global_tracer"));
        assert_eq!(global().provenance(ptr.as_ptr()).unwrap().size, 24);

        unsafe { crate::trace_free!(ptr.as_ptr()).unwrap() };
        let tracer = global();
        let stat = tracer.by_site().lookup(&owner).unwrap();
        assert_eq!((stat.allocate_count, stat.release_count), (1, 1));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let _ = std::thread::spawn(|| {
            let _guard = global();
            panic!("poison the global tracer");
        })
        .join();
        let ptr = crate::trace_malloc!(1).unwrap();
        unsafe { crate::trace_free!(ptr.as_ptr()).unwrap() };
    }
}
