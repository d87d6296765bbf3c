use std::{mem, num::NonZeroUsize};

use super::{cursor::Cursor, hash::djb2, KeyedMap, MapError};

/// Bucket count used by [`BucketMap::new()`]
pub const DEFAULT_BUCKET_COUNT: NonZeroUsize = match NonZeroUsize::new(7) {
    Some(n) => n,
    None => unreachable!(),
};

/// Index of an entry in [`BucketMap::slots`]
type EntryId = usize;

pub(super) struct Entry<V> {
    pub(super) hash: u64,
    pub(super) key: String,
    pub(super) value: V,
    left: Option<EntryId>,
    right: Option<EntryId>,
    parent: Option<EntryId>,
    /// Insertion-order chain of the entry's bucket
    prev: Option<EntryId>,
    pub(super) next: Option<EntryId>,
}

enum Slot<V> {
    Occupied(Entry<V>),
    /// Vacant slots form an intrusive free list, so releasing an entry never
    /// needs to allocate.
    Vacant { next_free: Option<EntryId> },
}

#[derive(Clone, Copy, Default)]
pub(super) struct Bucket {
    root: Option<EntryId>,
    pub(super) head: Option<EntryId>,
    tail: Option<EntryId>,
}

/// A hash map of `String -> V` with a fixed bucket array. See the [module
/// docs](super) for the layout.
///
/// Inside a bucket the tree is ordered by hash with `left <= node < right`.
/// Two keys with the same hash are told apart by comparing the keys at every
/// node on the way down, so a collision never hides an entry.
pub struct BucketMap<V> {
    buckets: Box<[Bucket]>,
    slots: Vec<Slot<V>>,
    free_head: Option<EntryId>,
    len: usize,
}

impl<V> Default for BucketMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BucketMap<V> {
    /// An empty map with [`DEFAULT_BUCKET_COUNT`] buckets
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    /// An empty map with `bucket_count` buckets. The count never changes.
    pub fn with_buckets(bucket_count: NonZeroUsize) -> Self {
        Self {
            buckets: vec![Bucket::default(); bucket_count.get()].into_boxed_slice(),
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_of(&self, hash: u64) -> usize {
        // `usize` always fits the remainder, since it is below `buckets.len()`
        (hash % self.buckets.len() as u64) as usize
    }

    pub(super) fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    pub(super) fn entry(&self, id: EntryId) -> &Entry<V> {
        match &self.slots[id] {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => unreachable!("link to vacant slot {id}"),
        }
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut Entry<V> {
        match &mut self.slots[id] {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => unreachable!("link to vacant slot {id}"),
        }
    }

    fn find(&self, bucket: usize, hash: u64, key: &str) -> Option<EntryId> {
        let mut cursor = self.buckets[bucket].root;
        while let Some(id) = cursor {
            let entry = self.entry(id);
            if entry.hash == hash && entry.key == key {
                return Some(id);
            }
            cursor = if hash <= entry.hash {
                entry.left
            } else {
                entry.right
            };
        }
        None
    }

    pub fn lookup(&self, key: &str) -> Option<&V> {
        let hash = djb2(key);
        let id = self.find(self.bucket_of(hash), hash, key)?;
        Some(&self.entry(id).value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Store `value` under `key`. If the key was already present its value is
    /// swapped out in place and returned; the entry keeps its position in
    /// both the tree and the insertion chain.
    ///
    /// # Errors
    ///
    /// [`MapError::ResourceExhausted`] if a new entry was needed and could not
    /// be allocated. `value` is dropped and the map is untouched.
    pub fn upsert(&mut self, key: &str, value: V) -> Result<Option<V>, MapError> {
        let hash = djb2(key);
        let bucket = self.bucket_of(hash);

        let mut parent = None;
        let mut cursor = self.buckets[bucket].root;
        while let Some(id) = cursor {
            let entry = self.entry_mut(id);
            if entry.hash == hash && entry.key == key {
                return Ok(Some(mem::replace(&mut entry.value, value)));
            }
            parent = Some(id);
            cursor = if hash <= entry.hash {
                entry.left
            } else {
                entry.right
            };
        }

        let owned_key = copy_key(key)?;
        let tail = self.buckets[bucket].tail;
        let id = self.alloc_slot(Entry {
            hash,
            key: owned_key,
            value,
            left: None,
            right: None,
            parent,
            prev: tail,
            next: None,
        })?;

        match parent {
            None => self.buckets[bucket].root = Some(id),
            Some(p) => {
                let parent = self.entry_mut(p);
                if hash <= parent.hash {
                    parent.left = Some(id);
                } else {
                    parent.right = Some(id);
                }
            }
        }
        match tail {
            None => self.buckets[bucket].head = Some(id),
            Some(t) => self.entry_mut(t).next = Some(id),
        }
        self.buckets[bucket].tail = Some(id);
        self.len += 1;
        Ok(None)
    }

    /// Remove `key` and hand its value back.
    ///
    /// A node with two children is replaced by its in-order predecessor (the
    /// rightmost node of its left subtree). Equal hashes live on the left, so
    /// the predecessor is the neighbour that keeps `left <= node < right`
    /// true. The predecessor is relinked, not copied, so every surviving
    /// entry keeps its own place in the insertion chain.
    ///
    /// # Errors
    ///
    /// [`MapError::KeyNotFound`] if `key` is absent. Nothing is modified.
    pub fn remove(&mut self, key: &str) -> Result<V, MapError> {
        let hash = djb2(key);
        let bucket = self.bucket_of(hash);
        let Some(id) = self.find(bucket, hash, key) else {
            return Err(MapError::KeyNotFound(key.to_owned()));
        };

        let (left, right) = {
            let entry = self.entry(id);
            (entry.left, entry.right)
        };
        match (left, right) {
            (None, None) => self.replace_in_parent(bucket, id, None),
            (Some(child), None) | (None, Some(child)) => {
                self.replace_in_parent(bucket, id, Some(child))
            }
            (Some(left), Some(right)) => {
                let mut pred = left;
                while let Some(next) = self.entry(pred).right {
                    pred = next;
                }
                if pred != left {
                    // `pred` has no right child, its left subtree takes its
                    // place under its old parent
                    let pred_left = self.entry(pred).left;
                    self.replace_in_parent(bucket, pred, pred_left);
                    self.entry_mut(pred).left = Some(left);
                    self.entry_mut(left).parent = Some(pred);
                }
                self.entry_mut(pred).right = Some(right);
                self.entry_mut(right).parent = Some(pred);
                self.replace_in_parent(bucket, id, Some(pred));
            }
        }

        self.unlink_from_chain(bucket, id);
        let entry = self.free_slot(id);
        self.len -= 1;
        Ok(entry.value)
    }

    pub fn iter(&self) -> Cursor<'_, V> {
        Cursor::new(self)
    }

    /// Point whatever referred to `node` (its parent, or the bucket root) at
    /// `replacement` instead.
    fn replace_in_parent(&mut self, bucket: usize, node: EntryId, replacement: Option<EntryId>) {
        let parent = self.entry(node).parent;
        match parent {
            None => self.buckets[bucket].root = replacement,
            Some(p) => {
                let parent = self.entry_mut(p);
                if parent.left == Some(node) {
                    parent.left = replacement;
                } else {
                    parent.right = replacement;
                }
            }
        }
        if let Some(r) = replacement {
            self.entry_mut(r).parent = parent;
        }
    }

    fn unlink_from_chain(&mut self, bucket: usize, id: EntryId) {
        let (prev, next) = {
            let entry = self.entry(id);
            (entry.prev, entry.next)
        };
        match prev {
            None => self.buckets[bucket].head = next,
            Some(p) => self.entry_mut(p).next = next,
        }
        match next {
            None => self.buckets[bucket].tail = prev,
            Some(n) => self.entry_mut(n).prev = prev,
        }
    }

    fn alloc_slot(&mut self, entry: Entry<V>) -> Result<EntryId, MapError> {
        if let Some(id) = self.free_head {
            let Slot::Vacant { next_free } = self.slots[id] else {
                unreachable!("free list points at occupied slot {id}");
            };
            self.free_head = next_free;
            self.slots[id] = Slot::Occupied(entry);
            return Ok(id);
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| MapError::ResourceExhausted)?;
        self.slots.push(Slot::Occupied(entry));
        Ok(self.slots.len() - 1)
    }

    fn free_slot(&mut self, id: EntryId) -> Entry<V> {
        let vacant = Slot::Vacant {
            next_free: self.free_head,
        };
        self.free_head = Some(id);
        match mem::replace(&mut self.slots[id], vacant) {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => unreachable!("double free of slot {id}"),
        }
    }

    /// Check every structural invariant of the map, panicking on the first
    /// one that does not hold.
    #[cfg(test)]
    pub(super) fn assert_invariants(&self) {
        let mut live = 0;
        for (index, bucket) in self.buckets.iter().enumerate() {
            // tree: parent links, hash ordering, bucket membership
            let mut in_tree = 0;
            let mut stack = Vec::new();
            if let Some(root) = bucket.root {
                assert_eq!(self.entry(root).parent, None, "root has a parent");
                stack.push((root, None::<u64>, None::<u64>));
            }
            while let Some((id, low, high)) = stack.pop() {
                let entry = self.entry(id);
                in_tree += 1;
                assert_eq!(self.bucket_of(entry.hash), index, "entry in wrong bucket");
                assert_eq!(djb2(&entry.key), entry.hash, "stale hash");
                if let Some(low) = low {
                    assert!(entry.hash > low, "right subtree must be > its ancestor");
                }
                if let Some(high) = high {
                    assert!(entry.hash <= high, "left subtree must be <= its ancestor");
                }
                if let Some(l) = entry.left {
                    assert_eq!(self.entry(l).parent, Some(id));
                    stack.push((l, low, Some(entry.hash)));
                }
                if let Some(r) = entry.right {
                    assert_eq!(self.entry(r).parent, Some(id));
                    stack.push((r, Some(entry.hash), high));
                }
            }

            // chain: doubly linked, same population as the tree
            let mut in_chain = 0;
            let mut prev = None;
            let mut cursor = bucket.head;
            while let Some(id) = cursor {
                let entry = self.entry(id);
                assert_eq!(entry.prev, prev, "broken chain back link");
                in_chain += 1;
                prev = Some(id);
                cursor = entry.next;
            }
            assert_eq!(bucket.tail, prev, "chain tail is not the last entry");
            assert_eq!(in_tree, in_chain, "tree and chain disagree in bucket {index}");
            live += in_tree;
        }
        assert_eq!(live, self.len, "len() does not match the live entries");
    }
}

impl<V> KeyedMap for BucketMap<V> {
    type Value = V;
    type Iter<'a> = Cursor<'a, V> where Self: 'a;

    fn upsert(&mut self, key: &str, value: V) -> Result<Option<V>, MapError> {
        BucketMap::upsert(self, key, value)
    }

    fn lookup(&self, key: &str) -> Option<&V> {
        BucketMap::lookup(self, key)
    }

    fn remove(&mut self, key: &str) -> Result<V, MapError> {
        BucketMap::remove(self, key)
    }

    fn iter(&self) -> Cursor<'_, V> {
        BucketMap::iter(self)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Copy `key` into a fresh `String`, reporting allocation failure instead of
/// aborting.
fn copy_key(key: &str) -> Result<String, MapError> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(key.len())
        .map_err(|_| MapError::ResourceExhausted)?;
    owned.push_str(key);
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_bucket<V>() -> BucketMap<V> {
        BucketMap::with_buckets(NonZeroUsize::MIN)
    }

    fn keys<V>(map: &BucketMap<V>) -> Vec<&str> {
        map.iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn empty_map_finds_nothing() {
        let map = BucketMap::<u32>::new();
        assert_eq!(map.bucket_count(), 7);
        assert_eq!(map.lookup("foo"), None);
        assert_eq!(map.iter().count(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn single_bucket_iterates_in_insertion_order() {
        let mut map = one_bucket();
        map.upsert("foo", 1).unwrap();
        map.upsert("bar", 2).unwrap();
        map.upsert("aaa", 3).unwrap();
        assert_eq!(keys(&map), ["foo", "bar", "aaa"]);
        assert_eq!(map.lookup("bar"), Some(&2));
        map.assert_invariants();
    }

    #[test]
    fn upsert_returns_the_replaced_value_once() {
        let mut map = BucketMap::new();
        assert_eq!(map.upsert("k", String::from("a")).unwrap(), None);
        assert_eq!(map.upsert("k", String::from("b")).unwrap().as_deref(), Some("a"));
        assert_eq!(map.upsert("k", String::from("c")).unwrap().as_deref(), Some("b"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("k").map(String::as_str), Some("c"));
    }

    #[test]
    fn replacing_a_value_keeps_chain_position() {
        let mut map = one_bucket();
        for (i, k) in ["a", "b", "c"].into_iter().enumerate() {
            map.upsert(k, i).unwrap();
        }
        map.upsert("a", 10).unwrap();
        assert_eq!(keys(&map), ["a", "b", "c"]);
    }

    #[test]
    fn every_bucket_is_reachable() {
        let mut map = BucketMap::new();
        for i in 0..200 {
            map.upsert(&format!("key-{i}"), i).unwrap();
        }
        let used = map.buckets.iter().filter(|b| b.root.is_some()).count();
        assert_eq!(used, map.bucket_count());
        map.assert_invariants();
    }

    #[test]
    fn colliding_keys_stay_distinct() {
        let mut map = BucketMap::new();
        for (i, k) in ["AbAb", "AbBA", "BAAb", "BABA"].into_iter().enumerate() {
            map.upsert(k, i).unwrap();
        }
        assert_eq!(map.len(), 4);
        assert_eq!(map.lookup("AbAb"), Some(&0));
        assert_eq!(map.lookup("AbBA"), Some(&1));
        assert_eq!(map.lookup("BAAb"), Some(&2));
        assert_eq!(map.lookup("BABA"), Some(&3));
        assert_eq!(map.lookup("ABAB"), None);
        map.assert_invariants();

        assert_eq!(map.remove("AbBA").unwrap(), 1);
        assert_eq!(map.lookup("BAAb"), Some(&2));
        assert_eq!(map.lookup("BABA"), Some(&3));
        assert_eq!(keys(&map), ["AbAb", "BAAb", "BABA"]);
        map.assert_invariants();
    }

    #[test]
    fn removing_an_absent_key_changes_nothing() {
        let mut map = BucketMap::new();
        map.upsert("present", 1).unwrap();
        assert_eq!(
            map.remove("absent"),
            Err(MapError::KeyNotFound(String::from("absent")))
        );
        assert_eq!(map.len(), 1);
        assert_eq!(keys(&map), ["present"]);
    }

    #[test]
    fn remove_leaf_single_child_and_two_children() {
        // In a single bucket, the tree shape follows hash order. Insert enough
        // keys that the root ends up with two children.
        let mut map = one_bucket();
        let all = ["m", "f", "t", "c", "h", "p", "w", "a", "e", "g"];
        for (i, k) in all.into_iter().enumerate() {
            map.upsert(k, i).unwrap();
        }
        map.assert_invariants();

        let root = map.buckets[0].root.unwrap();
        let root_key = map.entry(root).key.clone();
        assert!(map.entry(root).left.is_some() && map.entry(root).right.is_some());
        map.remove(&root_key).unwrap();
        map.assert_invariants();

        for k in all.into_iter().filter(|k| *k != root_key) {
            assert!(map.contains_key(k), "{k} lost after removing the root");
        }
        let expected: Vec<_> = all.into_iter().filter(|k| *k != root_key).collect();
        assert_eq!(keys(&map), expected);

        for k in expected.iter().rev() {
            map.remove(k).unwrap();
            map.assert_invariants();
        }
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut map = BucketMap::new();
        map.upsert("a", 1).unwrap();
        map.upsert("b", 2).unwrap();
        map.remove("a").unwrap();
        map.upsert("c", 3).unwrap();
        assert_eq!(map.slots.len(), 2);
        map.assert_invariants();
    }

    #[test]
    fn reinserting_a_removed_key_moves_it_to_the_chain_tail() {
        let mut map = one_bucket();
        map.upsert("x", 1).unwrap();
        map.upsert("y", 2).unwrap();
        map.remove("x").unwrap();
        map.upsert("x", 3).unwrap();
        assert_eq!(keys(&map), ["y", "x"]);
    }

    #[test]
    fn values_are_dropped_exactly_once() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        let mut map = BucketMap::new();
        map.upsert("a", Rc::clone(&tracker)).unwrap();
        let old = map.upsert("a", Rc::clone(&tracker)).unwrap();
        assert_eq!(Rc::strong_count(&tracker), 3);
        drop(old);
        let removed = map.remove("a").unwrap();
        drop(removed);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }
}
