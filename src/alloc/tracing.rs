//! Allocation provenance: which call site owns each live allocation, and how
//! many allocations and releases every call site has issued.
//!
//! A [`Tracer`] wraps a [`RawAllocator`] and keeps two keyed maps:
//!
//! - `by_site`: `"<file>-<line>-<function>"` -> [`CallSiteStat`]
//! - `by_address`: address key -> [`AddressRecord`]
//!
//! A record in `by_address` means exactly "this address is live, and was
//! allocated from this site". Leak candidates are the sites whose allocate
//! count exceeds their release count, and the addresses still in
//! `by_address`.
//!
//! The tracer does no locking of its own. Share it between threads behind a
//! mutex (see [`global()`](super::global::global)).

use std::ptr::NonNull;

use log::{error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::TracerConfig,
    error::TraceError,
    map::{BucketMap, KeyedMap, MapError},
};

use super::{key::AddressKeyFormat, manual::RawAllocator, site::CallSite};

/// Statistics of one call site. Replaced wholesale on every allocation or
/// release from that site, never updated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteStat {
    pub site: String,
    pub allocate_count: u64,
    pub release_count: u64,
    /// Address of the most recent allocation or release at this site
    pub last_address: usize,
}

impl CallSiteStat {
    /// Allocations from this site that have not been released (yet)
    pub fn outstanding(&self) -> u64 {
        self.allocate_count.saturating_sub(self.release_count)
    }
}

/// Provenance of one live address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Key of the site that allocated it
    pub site: String,
    pub address: usize,
    /// Requested size in bytes
    pub size: usize,
}

pub struct Tracer<A, S = BucketMap<CallSiteStat>, L = BucketMap<AddressRecord>> {
    allocator: A,
    by_site: S,
    by_address: L,
    address_key: AddressKeyFormat,
}

impl<A> Tracer<A>
where
    A: RawAllocator,
{
    pub fn new(allocator: A) -> Self {
        Self::with_config(allocator, &TracerConfig::default())
    }

    pub fn with_config(allocator: A, config: &TracerConfig) -> Self {
        Self::with_maps(
            allocator,
            BucketMap::with_buckets(config.bucket_count),
            BucketMap::with_buckets(config.bucket_count),
            config.address_key,
        )
    }
}

impl<A, S, L> Tracer<A, S, L>
where
    A: RawAllocator,
    S: KeyedMap<Value = CallSiteStat>,
    L: KeyedMap<Value = AddressRecord>,
{
    /// Build a tracer over two empty maps of your choosing
    pub fn with_maps(allocator: A, by_site: S, by_address: L, address_key: AddressKeyFormat) -> Self {
        debug_assert!(by_site.is_empty() && by_address.is_empty());
        Self {
            allocator,
            by_site,
            by_address,
            address_key,
        }
    }

    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn by_site(&self) -> &S {
        &self.by_site
    }

    pub fn by_address(&self) -> &L {
        &self.by_address
    }

    pub fn site_stat(&self, site: &CallSite<'_>) -> Option<&CallSiteStat> {
        self.by_site.lookup(&site.key())
    }

    /// Who allocated `ptr`, if it is live
    pub fn provenance(&self, ptr: *const u8) -> Option<&AddressRecord> {
        self.by_address.lookup(&self.address_key.key(ptr as usize))
    }

    /// Number of live allocations
    pub fn live_count(&self) -> usize {
        self.by_address.len()
    }

    /// Allocate `size` bytes from the raw allocator and record the allocation
    /// against `site`.
    ///
    /// # Errors
    ///
    /// - [`TraceError::AllocationFailed`] if the raw allocator returned null.
    ///   Neither map is touched.
    /// - [`TraceError::Map`] if the bookkeeping could not be stored. The
    ///   fresh allocation is handed back to the raw allocator and both maps
    ///   are restored, so the call has no effect.
    pub fn on_allocate(&mut self, size: usize, site: &CallSite<'_>) -> Result<NonNull<u8>, TraceError> {
        let Some(ptr) = self.allocator.allocate(size) else {
            warn!("malloc({size}) failed at {site}");
            return Err(TraceError::AllocationFailed { size });
        };
        let address = ptr.as_ptr() as usize;
        let site_key = site.key();

        let stat = match self.by_site.lookup(&site_key) {
            Some(previous) => CallSiteStat {
                site: site_key.clone(),
                allocate_count: previous.allocate_count + 1,
                release_count: previous.release_count,
                last_address: address,
            },
            None => CallSiteStat {
                site: site_key.clone(),
                allocate_count: 1,
                release_count: 0,
                last_address: address,
            },
        };
        let previous = match self.by_site.upsert(&site_key, stat) {
            Ok(previous) => previous,
            Err(err) => return Err(self.abandon(ptr, err)),
        };

        // A stale record for a reused address is overwritten: an address
        // cannot be live twice at once.
        let address_key = self.address_key.key(address);
        let record = AddressRecord {
            site: site_key.clone(),
            address,
            size,
        };
        if let Err(err) = self.by_address.upsert(&address_key, record) {
            let restored = match previous {
                // existing key, so this cannot allocate
                Some(previous) => self.by_site.upsert(&site_key, previous).map(drop),
                None => self.by_site.remove(&site_key).map(drop),
            };
            if let Err(rollback) = restored {
                error!("could not roll back statistics of {site_key}: {rollback}");
            }
            return Err(self.abandon(ptr, err));
        }

        trace!("malloc({size}) = {address_key} at {site_key}");
        Ok(ptr)
    }

    /// Release `ptr` through the raw allocator, then retire its record.
    ///
    /// The memory is always released first, whatever the bookkeeping finds.
    ///
    /// # Errors
    ///
    /// - [`TraceError::UntrackedRelease`] if `ptr` is not live. No map is
    ///   touched.
    /// - [`TraceError::InternalInconsistency`] if the owning site has no
    ///   statistics.
    ///
    /// # Safety
    ///
    /// Same as [`RawAllocator::deallocate()`].
    pub unsafe fn on_release(&mut self, ptr: *mut u8, site: &CallSite<'_>) -> Result<(), TraceError> {
        // SAFETY: requirement passed to caller
        unsafe { self.allocator.deallocate(ptr) };

        let address = ptr as usize;
        let address_key = self.address_key.key(address);
        let Some(record) = self.by_address.lookup(&address_key) else {
            warn!("free({address_key}) at {site}: not allocated, or already freed");
            return Err(TraceError::UntrackedRelease {
                address,
                site: site.key(),
            });
        };
        let owner = record.site.clone();

        let Some(stat) = self.by_site.lookup(&owner) else {
            error!("free({address_key}) at {site}: owner {owner} has no statistics");
            return Err(TraceError::InternalInconsistency {
                address,
                site: owner,
            });
        };
        let stat = CallSiteStat {
            site: owner.clone(),
            allocate_count: stat.allocate_count,
            release_count: stat.release_count + 1,
            last_address: address,
        };
        self.by_site.upsert(&owner, stat)?;
        self.by_address.remove(&address_key)?;

        trace!("free({address_key}) at {site}, allocated at {owner}");
        Ok(())
    }

    /// Give a pointer we failed to record back to the raw allocator
    fn abandon(&mut self, ptr: NonNull<u8>, err: MapError) -> TraceError {
        warn!("dropping allocation {:p}, could not record it: {err}", ptr);
        // SAFETY: `ptr` came from `self.allocator` and was never handed out
        unsafe { self.allocator.deallocate(ptr.as_ptr()) };
        TraceError::Map(err)
    }
}
