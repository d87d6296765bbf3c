//! A string-keyed map with a fixed number of buckets, where every bucket is an
//! (unbalanced) binary search tree ordered by key hash.
//!
//! Each bucket also threads its entries onto an insertion-order chain, so a
//! full walk of the map visits buckets in index order and, inside a bucket,
//! entries in the order they were first inserted. The shape of the tree has
//! no influence on iteration order.
//!
//! The map never grows its bucket array and never rebalances. Worst case
//! lookups are `O(n)` in the size of a bucket.
//!
//! ```
//! use mtrace::map::{BucketMap, KeyedMap};
//!
//! let mut map = BucketMap::new();
//! assert_eq!(map.upsert("foo", 1).unwrap(), None);
//! assert_eq!(map.upsert("foo", 2).unwrap(), Some(1));
//! assert_eq!(map.lookup("foo"), Some(&2));
//! assert_eq!(map.remove("foo").unwrap(), 2);
//! assert!(map.is_empty());
//! ```

mod bucket;
mod cursor;
pub mod hash;
#[cfg(test)]
mod proptests;

pub use bucket::{BucketMap, DEFAULT_BUCKET_COUNT};
pub use cursor::Cursor;

/// Errors returned by a [`KeyedMap`].
#[non_exhaustive]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MapError {
    /// `remove()` was asked for a key that is not in the map
    #[error("key `{0}` is not present in the map")]
    KeyNotFound(String),
    /// The map could not allocate storage for a new entry. The map is left
    /// exactly as it was before the call.
    #[error("could not allocate storage for a new map entry")]
    ResourceExhausted,
}

/// The operations the tracer needs from a string-keyed map.
///
/// Values move in through [`upsert()`](KeyedMap::upsert) and move back out
/// through either the return value of `upsert()` (the value that was
/// replaced) or [`remove()`](KeyedMap::remove). `lookup()` and iteration only
/// ever lend the value.
pub trait KeyedMap {
    type Value;
    type Iter<'a>: Iterator<Item = (&'a str, &'a Self::Value)>
    where
        Self: 'a;

    /// Insert `value` under `key`, or replace the value already there. The
    /// replaced value is handed back.
    fn upsert(&mut self, key: &str, value: Self::Value) -> Result<Option<Self::Value>, MapError>;

    fn lookup(&self, key: &str) -> Option<&Self::Value>;

    /// Remove `key`, transferring ownership of its value to the caller.
    fn remove(&mut self, key: &str) -> Result<Self::Value, MapError>;

    /// Walk every entry: buckets in ascending order, insertion order inside a
    /// bucket.
    fn iter(&self) -> Self::Iter<'_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
