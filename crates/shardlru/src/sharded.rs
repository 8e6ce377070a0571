//! ShardedLruCache: hash-partitioned set of LRU shards

use std::borrow::Borrow;
use std::fmt;
use std::fmt::Write as _;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{ShardedConfig, DEFAULT_SHARD_BITS};
use crate::entry::Handle;
use crate::error::{ReleaseError, Result};
use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Thread-safe LRU cache split into independently locked shards.
///
/// Every key is routed to exactly one shard by `hash(key) % shard_count`.
/// Operations on keys in different shards never contend, and whole-cache
/// sweeps lock one shard at a time.
///
/// # Example
///
/// ```
/// use shardlru::ShardedLruCache;
///
/// let cache = ShardedLruCache::new(100);
/// let handle = cache.insert("user:1", "alice");
/// cache.release(handle).unwrap();
///
/// let found = cache.lookup("user:1").unwrap();
/// assert_eq!(*found.value(), "alice");
/// cache.release(found).unwrap();
/// ```
pub struct ShardedLruCache<K, V> {
    /// One LRU per shard, each behind its own lock
    shards: Box<[Mutex<LruCache<K, V>>]>,

    /// Key hasher used for routing
    hasher: RandomState,

    /// Capacity of each individual shard
    shard_capacity: AtomicUsize,

    /// Statistics shared by all shards
    stats: Arc<CacheStats>,
}

impl<K, V> ShardedLruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a cache of `capacity` total charge units over 16 shards
    pub fn new(capacity: usize) -> Self {
        Self::build(&ShardedConfig::new(capacity).shard_bits(DEFAULT_SHARD_BITS))
    }

    /// Create a cache from explicit settings
    pub fn with_config(config: ShardedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &ShardedConfig) -> Self {
        let [k0, k1, k2, k3] = config.hash_seeds();
        let stats = Arc::new(CacheStats::new());
        let per_shard = config.shard_capacity();

        let shards = (0..config.shard_count())
            .map(|_| Mutex::new(LruCache::with_stats(per_shard, Arc::clone(&stats))))
            .collect();

        debug!(
            shards = config.shard_count(),
            capacity = config.capacity(),
            per_shard,
            "created sharded cache"
        );

        Self {
            shards,
            hasher: RandomState::with_seeds(k0, k1, k2, k3),
            shard_capacity: AtomicUsize::new(per_shard),
            stats,
        }
    }

    /// Index of the shard that owns `key`
    pub fn shard_for<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        (BuildHasher::hash_one(&self.hasher, key) % self.shards.len() as u64) as usize
    }

    fn shard<Q>(&self, key: &Q) -> &Mutex<LruCache<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        &self.shards[self.shard_for(key)]
    }

    /// Insert with a charge of one
    pub fn insert(&self, key: K, value: V) -> Handle<K, V> {
        self.insert_with_charge(key, value, 1)
    }

    /// Insert into the owning shard, evicting from that shard only
    pub fn insert_with_charge(&self, key: K, value: V, charge: usize) -> Handle<K, V> {
        let shard = self.shard(&key);
        shard.lock().insert_with_charge(key, value, charge)
    }

    /// Look up `key` in its shard. A returned handle must be released once.
    pub fn lookup<Q>(&self, key: &Q) -> Option<Handle<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).lock().lookup(key)
    }

    /// Release a handle to the shard derived from its own key.
    ///
    /// A handle from another cache comes back inside the [`ReleaseError`].
    pub fn release(
        &self,
        handle: Handle<K, V>,
    ) -> std::result::Result<(), ReleaseError<K, V>> {
        let shard = self.shard(handle.key());
        shard.lock().release(handle)
    }

    /// Erase `key` from its shard. Returns false if it was not indexed.
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).lock().erase(key)
    }

    /// Check whether `key` is indexed without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard(key).lock().contains(key)
    }

    /// Prune every shard in index order; returns entries reclaimed
    pub fn prune(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().prune()).sum()
    }

    /// Erase every indexed entry in every shard
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }

    /// Re-divide `capacity` over the shards, evicting where a shard is now over
    pub fn set_capacity(&self, capacity: usize) {
        let per_shard = capacity.div_ceil(self.shards.len());
        self.shard_capacity.store(per_shard, Ordering::Relaxed);
        for shard in self.shards.iter() {
            shard.lock().set_capacity(per_shard);
        }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Capacity of each shard
    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity.load(Ordering::Relaxed)
    }

    /// Effective capacity of the whole cache (shard capacity times shard
    /// count), saturating at `usize::MAX`
    pub fn total_capacity(&self) -> usize {
        self.shard_capacity().saturating_mul(self.shards.len())
    }

    /// Sum of usage over all shards, saturating at `usize::MAX`
    pub fn total_usage(&self) -> usize {
        self.shards
            .iter()
            .fold(0usize, |acc, shard| acc.saturating_add(shard.lock().usage()))
    }

    /// Sum of detached usage over all shards, saturating at `usize::MAX`
    pub fn detached_usage(&self) -> usize {
        self.shards
            .iter()
            .fold(0usize, |acc, shard| acc.saturating_add(shard.lock().detached_usage()))
    }

    /// Number of indexed entries over all shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if no shard indexes anything
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Dump every shard in index order
    pub fn debug_dump(&self) -> String
    where
        K: fmt::Debug,
    {
        let mut out = String::new();
        for (idx, shard) in self.shards.iter().enumerate() {
            let dump = shard.lock().debug_dump();
            // writing to a String cannot fail
            let _ = writeln!(out, "Shard: {}", idx);
            out.push_str(&dump);
            out.push('\n');
        }
        out
    }
}
