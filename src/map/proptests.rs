use super::*;

use hashbrown::HashMap;
use proptest::prelude::*;
use rand::{seq::SliceRandom, SeedableRng};
use std::num::NonZeroUsize;

#[derive(Clone, Debug)]
enum Op {
    Upsert(String, u32),
    Remove(String),
    Lookup(String),
}

fn key_strategy() -> impl Strategy<Value = String> + Clone {
    // A tiny alphabet built from the djb2 collision pair ('A'*33+'b' ==
    // 'B'*33+'A'), so equal hashes with different keys turn up constantly.
    prop::collection::vec(prop_oneof![Just("Ab"), Just("BA"), Just("x")], 0..=4)
        .prop_map(|parts| parts.concat())
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Upsert(k, v)),
        30 => key.clone().prop_map(Op::Remove),
        20 => key.prop_map(Op::Lookup),
    ];
    prop::collection::vec(op, 0..=400)
}

/// Run `ops` against both the map and a `hashbrown` model, recording the
/// expected chain order per bucket.
fn check_against_model(bucket_count: NonZeroUsize, ops: Vec<Op>) {
    let mut map = BucketMap::with_buckets(bucket_count);
    let mut model: HashMap<String, u32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for op in ops {
        match op {
            Op::Upsert(k, v) => {
                let prev = map.upsert(&k, v).unwrap();
                let expected = model.insert(k.clone(), v);
                assert_eq!(prev, expected, "upsert({k:?}) returned the wrong old value");
                if expected.is_none() {
                    order.push(k);
                }
            }
            Op::Remove(k) => match model.remove(&k) {
                Some(v) => {
                    assert_eq!(map.remove(&k), Ok(v));
                    order.retain(|o| *o != k);
                }
                None => {
                    assert_eq!(map.remove(&k), Err(MapError::KeyNotFound(k.clone())));
                }
            },
            Op::Lookup(k) => {
                assert_eq!(map.lookup(&k), model.get(&k));
            }
        }
        map.assert_invariants();
    }

    assert_eq!(map.len(), model.len());
    for (k, v) in &model {
        assert_eq!(map.lookup(k), Some(v));
    }

    // Buckets ascending, insertion order within a bucket. Sorting by bucket
    // is stable, so `order` already holds the within-bucket order.
    let n = bucket_count.get() as u64;
    let mut expected = order;
    expected.sort_by_key(|k| hash::djb2(k) % n);
    let walked: Vec<&str> = map.iter().map(|(k, _)| k).collect();
    assert_eq!(walked, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn default_buckets_match_model(ops in ops_strategy()) {
        check_against_model(DEFAULT_BUCKET_COUNT, ops);
    }

    #[test]
    fn single_bucket_matches_model(ops in ops_strategy()) {
        check_against_model(NonZeroUsize::MIN, ops);
    }

    #[test]
    fn any_bucket_count_matches_model(buckets in 1usize..=16, ops in ops_strategy()) {
        check_against_model(NonZeroUsize::new(buckets).unwrap(), ops);
    }
}

#[test]
fn shuffled_bulk_insert_then_remove_everything() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x6d74_7261_6365);
    let mut keys: Vec<String> = (0..2_000).map(|i| format!("src/main.c-{i}-main")).collect();
    keys.shuffle(&mut rng);

    let mut map = BucketMap::new();
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(map.upsert(k, i).unwrap(), None);
    }
    map.assert_invariants();
    assert_eq!(map.iter().count(), keys.len());

    keys.shuffle(&mut rng);
    for k in &keys {
        assert!(map.remove(k).is_ok());
    }
    map.assert_invariants();
    assert!(map.is_empty());
    assert_eq!(map.iter().next(), None);
}
