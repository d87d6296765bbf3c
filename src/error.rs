use std::io;

use crate::map::MapError;

/// Everything [`Tracer`](crate::alloc::Tracer) can report to its caller.
///
/// None of these are swallowed: the tracer logs the release-side ones and
/// still hands them back.
#[non_exhaustive]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceError {
    /// The raw allocator returned null. Nothing was recorded.
    #[error("allocator could not provide {size} bytes")]
    AllocationFailed { size: usize },
    /// Release of an address with no live record: never allocated through the
    /// tracer, or already released. The memory itself was still released.
    #[error("release of {address:#x} at {site}: address is not live")]
    UntrackedRelease { address: usize, site: String },
    /// The address map names a site the site map does not know. This is a bug
    /// in the tracer, and every statistic after it is suspect.
    #[error("live address {address:#x} belongs to `{site}`, which has no statistics")]
    InternalInconsistency { address: usize, site: String },
    /// A map operation failed, e.g. a new entry could not be allocated
    #[error(transparent)]
    Map(#[from] MapError),
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not write report: {0}")]
    IoError(#[from] io::Error),
    #[error("could not serialize report: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}
