// Multi-threaded tests for ShardedLruCache. These need real threads
// hammering shared shards and cannot live inline.

use std::sync::{Arc, Barrier};
use std::thread;

use shardlru::{ShardedConfig, ShardedLruCache};

#[test]
fn concurrent_mixed_workload_keeps_accounting() {
    let cache: Arc<ShardedLruCache<u64, u64>> = Arc::new(ShardedLruCache::new(256));
    let threads = 8;
    let per_thread = 2_000u64;
    let barrier = Arc::new(Barrier::new(threads));

    let workers: Vec<_> = (0..threads as u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let key = (t * 31 + i) % 1024;
                    match i % 4 {
                        0 | 1 => {
                            let handle = cache.insert(key, key * 2);
                            assert_eq!(*handle.value(), key * 2);
                            cache.release(handle).unwrap();
                        }
                        2 => {
                            if let Some(handle) = cache.lookup(&key) {
                                assert_eq!(*handle.value(), key * 2);
                                cache.release(handle).unwrap();
                            }
                        }
                        _ => {
                            cache.erase(&key);
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(cache.total_usage() <= cache.total_capacity());
    assert_eq!(cache.total_usage(), cache.len());
    assert_eq!(cache.detached_usage(), 0);
    assert_eq!(cache.stats().inserts(), threads as u64 * per_thread / 2);
}

#[test]
fn handle_outlives_eviction_from_another_thread() {
    let cache: Arc<ShardedLruCache<u64, String>> =
        Arc::new(ShardedLruCache::with_config(ShardedConfig::new(4).shard_bits(2)).unwrap());

    let held = cache.insert(0, "pinned".to_string());

    let flooder = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for key in 1..500u64 {
                let handle = cache.insert(key, format!("value {}", key));
                cache.release(handle).unwrap();
            }
        })
    };
    flooder.join().unwrap();

    assert!(!cache.contains(&0));
    assert!(!held.is_cached());
    assert_eq!(held.value(), "pinned");
    assert_eq!(cache.detached_usage(), 1);

    cache.release(held).unwrap();
    assert_eq!(cache.detached_usage(), 0);
}

#[test]
fn prune_runs_alongside_readers() {
    let cache: Arc<ShardedLruCache<u64, u64>> = Arc::new(ShardedLruCache::new(10_000));
    for key in 0..1000u64 {
        let handle = cache.insert(key, key);
        cache.release(handle).unwrap();
    }

    let readers: Vec<_> = (0..4u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for key in (t..1000).step_by(4) {
                    if let Some(handle) = cache.lookup(&key) {
                        assert_eq!(*handle.value(), key);
                        cache.release(handle).unwrap();
                    }
                }
            })
        })
        .collect();

    let pruner = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.prune())
    };

    for reader in readers {
        reader.join().unwrap();
    }
    let pruned = pruner.join().unwrap();

    assert_eq!(pruned + cache.prune(), 1000);
    assert!(cache.is_empty());
    assert_eq!(cache.total_usage(), 0);
}
