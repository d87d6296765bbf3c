//! Tracing `malloc()`/`free()`: the raw allocator seam, call-site capture and
//! the tracer that ties allocations to the sites that made them.

pub mod global;
mod key;
mod manual;
pub mod site;
mod tracing;

pub use key::AddressKeyFormat;
pub use manual::{LibcMalloc, RawAllocator};
pub use site::CallSite;
pub use tracing::{AddressRecord, CallSiteStat, Tracer};

#[cfg(test)]
pub(crate) use tracing::tests::ScriptedAlloc;
