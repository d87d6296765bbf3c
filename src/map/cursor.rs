use std::iter::FusedIterator;

use super::BucketMap;

/// Walks a [`BucketMap`]: buckets in ascending order, and inside each bucket
/// along its insertion chain.
///
/// The cursor borrows the map, so the map cannot change shape underneath it.
pub struct Cursor<'a, V> {
    map: &'a BucketMap<V>,
    /// Bucket that `next` belongs to
    bucket: usize,
    next: Option<usize>,
}

impl<'a, V> Cursor<'a, V> {
    pub(super) fn new(map: &'a BucketMap<V>) -> Self {
        let mut cursor = Self {
            map,
            bucket: 0,
            next: None,
        };
        cursor.seek_bucket(0);
        cursor
    }

    /// Point the cursor at the chain head of the first non-empty bucket at or
    /// after `from`
    fn seek_bucket(&mut self, from: usize) {
        self.bucket = from;
        self.next = None;
        while let Some(bucket) = self.map.bucket(self.bucket) {
            if bucket.head.is_some() {
                self.next = bucket.head;
                return;
            }
            self.bucket += 1;
        }
    }
}

impl<'a, V> Iterator for Cursor<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.map.entry(id);
        match entry.next {
            Some(next) => self.next = Some(next),
            None => self.seek_bucket(self.bucket + 1),
        }
        Some((entry.key.as_str(), &entry.value))
    }
}

impl<V> FusedIterator for Cursor<'_, V> {}
