//! Allocation provenance tracking.
//!
//! Every allocation and release that goes through a [`Tracer`] is recorded
//! twice: against the call site that made it, and against the address it
//! produced. What is left in those maps afterwards tells you which sites leak
//! and which releases were bogus.
//!
//! ```
//! use mtrace::{call_site, report::Report, LibcMalloc, Tracer};
//!
//! let mut tracer = Tracer::new(LibcMalloc);
//! let ptr = tracer.on_allocate(64, &call_site!()).unwrap();
//! let leaked = tracer.on_allocate(8, &call_site!()).unwrap();
//! unsafe { tracer.on_release(ptr.as_ptr(), &call_site!()).unwrap() };
//!
//! let report = Report::collect(&tracer);
//! assert_eq!(report.leaks().count(), 1);
//! # unsafe { tracer.on_release(leaked.as_ptr(), &call_site!()).unwrap() };
//! ```
//!
//! The maps underneath are [`map::BucketMap`]s, a fixed-size hash table of
//! binary search trees that remembers insertion order.

pub mod alloc;
pub mod config;
pub mod error;
pub mod map;
pub mod report;
mod serialize;
mod util;

pub use alloc::{global::global, AddressKeyFormat, CallSite, LibcMalloc, RawAllocator, Tracer};
pub use config::TracerConfig;
pub use error::{ReportError, TraceError};
