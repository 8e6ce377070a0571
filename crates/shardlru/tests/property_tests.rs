use proptest::prelude::*;
use shardlru::{Handle, LruCache, ShardedConfig, ShardedLruCache};

#[derive(Debug, Clone)]
enum Op {
    Insert { key: u8, charge: usize, hold: bool },
    Lookup { key: u8, hold: bool },
    Release(usize),
    Erase(u8),
    Prune,
}

/// Mostly small charges, plus zero and values near `usize::MAX`
fn charge_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        8 => 1usize..6,
        1 => Just(0usize),
        1 => Just(usize::MAX),
        1 => (usize::MAX / 2)..=usize::MAX,
    ]
}

fn capacity_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        4 => 0usize..24,
        1 => Just(usize::MAX),
        1 => (usize::MAX / 2)..=usize::MAX,
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..16, charge_strategy(), any::<bool>())
            .prop_map(|(key, charge, hold)| Op::Insert { key, charge, hold }),
        3 => (0u8..16, any::<bool>()).prop_map(|(key, hold)| Op::Lookup { key, hold }),
        2 => any::<usize>().prop_map(Op::Release),
        1 => (0u8..16).prop_map(Op::Erase),
        1 => Just(Op::Prune),
    ]
}

/// Plain LRU list, most recently used first: (key, charge, value)
struct Model {
    entries: Vec<(u8, usize, u64)>,
    capacity: usize,
}

impl Model {
    fn usage(&self) -> usize {
        self.entries.iter().map(|(_, charge, _)| charge).sum()
    }

    fn keys(&self) -> Vec<u8> {
        self.entries.iter().map(|(key, _, _)| *key).collect()
    }

    fn remove(&mut self, key: u8) -> Option<(u8, usize, u64)> {
        let pos = self.entries.iter().position(|(k, _, _)| *k == key)?;
        Some(self.entries.remove(pos))
    }

    fn insert(&mut self, key: u8, charge: usize, value: u64) {
        self.remove(key);
        while self.usage().checked_add(charge).is_none() {
            self.entries.pop();
        }
        self.entries.insert(0, (key, charge, value));
        while self.usage() > self.capacity {
            self.entries.pop();
        }
    }

    fn touch(&mut self, key: u8) -> Option<u64> {
        let entry = self.remove(key)?;
        self.entries.insert(0, entry);
        Some(entry.2)
    }
}

fn run_ops(capacity: usize, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut cache: LruCache<u8, u64> = LruCache::new(capacity);
    let mut model = Model {
        entries: Vec::new(),
        capacity,
    };
    let mut handles: Vec<Handle<u8, u64>> = Vec::new();

    for (seq, op) in ops.into_iter().enumerate() {
        let seq = seq as u64;
        match op {
            Op::Insert { key, charge, hold } => {
                let handle = cache.insert_with_charge(key, seq, charge);
                model.insert(key, charge, seq);
                prop_assert_eq!(*handle.value(), seq);
                if hold {
                    handles.push(handle);
                } else {
                    cache.release(handle).unwrap();
                }
            }
            Op::Lookup { key, hold } => {
                let found = cache.lookup(&key);
                let expected = model.touch(key);
                prop_assert_eq!(found.as_ref().map(|h| *h.value()), expected);
                if let Some(handle) = found {
                    if hold {
                        handles.push(handle);
                    } else {
                        cache.release(handle).unwrap();
                    }
                }
            }
            Op::Release(idx) => {
                if !handles.is_empty() {
                    let handle = handles.swap_remove(idx % handles.len());
                    cache.release(handle).unwrap();
                }
            }
            Op::Erase(key) => {
                prop_assert_eq!(cache.erase(&key), model.remove(key).is_some());
            }
            Op::Prune => {
                let held: Vec<u8> = handles
                    .iter()
                    .filter(|h| h.is_cached())
                    .map(|h| *h.key())
                    .collect();
                let before = cache.len();
                let pruned = cache.prune();
                model.entries.retain(|(key, _, _)| held.contains(key));
                prop_assert_eq!(before - pruned, model.entries.len());
            }
        }

        let keys = cache.keys();
        prop_assert_eq!(&keys, &model.keys());
        prop_assert_eq!(cache.len(), keys.len());
        prop_assert_eq!(cache.usage(), model.usage());
        prop_assert!(cache.usage() <= capacity);
    }

    for handle in handles.drain(..) {
        cache.release(handle).unwrap();
    }
    prop_assert_eq!(cache.detached_usage(), 0);
    Ok(())
}

proptest! {
    #[test]
    fn test_matches_reference_lru(
        capacity in capacity_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..120)
    ) {
        run_ops(capacity, ops)?;
    }

    #[test]
    fn test_shard_capacity_is_ceiling(
        capacity in prop_oneof![0usize..100_000, (usize::MAX - 4096)..=usize::MAX],
        bits in 0u32..=10
    ) {
        let config = ShardedConfig::new(capacity).shard_bits(bits);
        let per_shard = config.shard_capacity() as u128;
        let shards = config.shard_count() as u128;
        let capacity = capacity as u128;

        prop_assert!(per_shard * shards >= capacity);
        if per_shard > 0 {
            prop_assert!((per_shard - 1) * shards < capacity);
        }

        let cache: ShardedLruCache<u64, ()> = ShardedLruCache::with_config(config).unwrap();
        let total = cache.total_capacity() as u128;
        prop_assert_eq!(total, (per_shard * shards).min(usize::MAX as u128));
    }

    #[test]
    fn test_sharded_usage_accounting(
        inserts in prop::collection::vec((0u64..200, 0usize..8), 1..100),
        erases in prop::collection::vec(0u64..200, 0..20)
    ) {
        let cache: ShardedLruCache<u64, usize> = ShardedLruCache::new(1 << 20);
        let mut expected = std::collections::HashMap::new();

        for (key, charge) in inserts {
            let handle = cache.insert_with_charge(key, charge, charge);
            cache.release(handle).unwrap();
            expected.insert(key, charge);
        }
        for key in erases {
            prop_assert_eq!(cache.erase(&key), expected.remove(&key).is_some());
        }

        prop_assert_eq!(cache.len(), expected.len());
        prop_assert_eq!(cache.total_usage(), expected.values().sum::<usize>());
        for (key, charge) in &expected {
            let handle = cache.lookup(key).unwrap();
            prop_assert_eq!(handle.charge(), *charge);
            prop_assert_eq!(cache.shard_for(handle.key()), cache.shard_for(key));
            cache.release(handle).unwrap();
        }
    }
}
