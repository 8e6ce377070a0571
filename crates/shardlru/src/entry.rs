//! Cached records and the handles given out to callers

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single cached record plus its bookkeeping.
///
/// `refs` counts the shard's own reference (while indexed) and every
/// outstanding [`Handle`]. It is only mutated while the owning shard is
/// borrowed mutably, so atomics are needed for `Sync`, not for ordering.
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) charge: usize,
    /// Id of the [`LruCache`](crate::LruCache) that created this entry
    pub(crate) owner: u64,
    refs: AtomicUsize,
    cached: AtomicBool,
}

impl<K, V> Entry<K, V> {
    /// New entries start with two references: the index and the caller.
    pub(crate) fn new(key: K, value: V, charge: usize, owner: u64) -> Self {
        Self {
            key,
            value,
            charge,
            owner,
            refs: AtomicUsize::new(2),
            cached: AtomicBool::new(true),
        }
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference and return how many remain.
    ///
    /// # Panics
    /// Panics if the count is already zero.
    pub(crate) fn unref(&self) -> usize {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| refs.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => panic!("release of an entry whose refcount is already zero"),
        }
    }

    pub(crate) fn is_cached(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }

    pub(crate) fn set_uncached(&self) {
        self.cached.store(false, Ordering::Release);
    }
}

/// A counted reference to a cached entry.
///
/// Every handle returned by `insert` or `lookup` must be given back through
/// `release` exactly once. The value stays readable for as long as the
/// handle is held, even after the cache has evicted or erased the key.
#[must_use = "handles must be released back to the cache that issued them"]
pub struct Handle<K, V> {
    pub(crate) entry: Arc<Entry<K, V>>,
}

impl<K, V> Handle<K, V> {
    pub(crate) fn new(entry: Arc<Entry<K, V>>) -> Self {
        Self { entry }
    }

    /// Key the entry was inserted under
    pub fn key(&self) -> &K {
        &self.entry.key
    }

    /// Cached value
    pub fn value(&self) -> &V {
        &self.entry.value
    }

    /// Capacity units this entry consumes
    pub fn charge(&self) -> usize {
        self.entry.charge
    }

    /// Current reference count, including the cache's own reference
    pub fn refs(&self) -> usize {
        self.entry.refs()
    }

    /// Whether the cache still indexes this entry
    pub fn is_cached(&self) -> bool {
        self.entry.is_cached()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Handle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.entry.key)
            .field("value", &self.entry.value)
            .field("charge", &self.entry.charge)
            .field("refs", &self.entry.refs())
            .field("cached", &self.entry.is_cached())
            .finish()
    }
}
