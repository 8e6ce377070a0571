//! Single-shard LRU cache with reference-counted entries
//!
//! Uses an index-linked list over a slot arena for O(1) touch, unlink and
//! eviction. The front of the list is the most recently used entry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use tracing::{debug, trace};

use crate::entry::{Entry, Handle};
use crate::error::{Error, ReleaseError};
use crate::stats::CacheStats;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    entry: Arc<Entry<K, V>>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU cache bounded by the total charge of its entries.
///
/// Not synchronized; [`ShardedLruCache`](crate::ShardedLruCache) wraps each
/// shard in a mutex.
pub struct LruCache<K, V> {
    id: u64,
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    /// Sum of charges of indexed entries
    usage: usize,
    /// Sum of charges of unindexed entries still held by callers
    detached: usize,
    capacity: usize,
    stats: Arc<CacheStats>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache with the given capacity.
    ///
    /// A capacity of zero is allowed; every insert is then evicted before it
    /// returns, though the returned handle stays valid.
    pub fn new(capacity: usize) -> Self {
        Self::with_stats(capacity, Arc::new(CacheStats::new()))
    }

    pub(crate) fn with_stats(capacity: usize, stats: Arc<CacheStats>) -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            usage: 0,
            detached: 0,
            capacity,
            stats,
        }
    }

    /// Unique id of this cache, recorded in every entry it creates
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Change the eviction threshold, evicting immediately if usage is over it
    pub fn set_capacity(&mut self, capacity: usize) {
        debug!(cache = self.id, old = self.capacity, new = capacity, "set capacity");
        self.capacity = capacity;
        self.evict_to_capacity();
    }

    /// Eviction threshold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of charges of all indexed entries
    pub fn usage(&self) -> usize {
        self.usage
    }

    /// Sum of charges of entries no longer indexed but still held by a handle
    pub fn detached_usage(&self) -> usize {
        self.detached
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache indexes nothing
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Statistics for this cache
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Insert with a charge of one
    pub fn insert(&mut self, key: K, value: V) -> Handle<K, V> {
        self.insert_with_charge(key, value, 1)
    }

    /// Insert `value` under `key`, consuming `charge` units of capacity.
    ///
    /// Any entry already indexed under `key` is displaced. After insertion the
    /// least recently used entries are evicted until usage fits capacity,
    /// which may include the new entry itself. Never fails.
    ///
    /// If `usage + charge` would not fit in a `usize`, older entries are
    /// evicted first until it does.
    pub fn insert_with_charge(&mut self, key: K, value: V, charge: usize) -> Handle<K, V> {
        let entry = Arc::new(Entry::new(key.clone(), value, charge, self.id));

        if let Some(&old) = self.map.get(&key) {
            self.remove_indexed(old);
        }

        // an empty cache has zero usage, so this always terminates
        while self.usage.checked_add(charge).is_none() {
            if !self.evict_lru() {
                break;
            }
        }

        let idx = self.alloc_node(Node {
            entry: Arc::clone(&entry),
            prev: None,
            next: None,
        });
        self.attach_front(idx);
        self.map.insert(key, idx);
        self.usage += charge;
        self.stats.record_insert();

        self.evict_to_capacity();
        Handle::new(entry)
    }

    /// Look up `key`, marking it most recently used on a hit.
    ///
    /// A returned handle must be released exactly once.
    pub fn lookup<Q>(&mut self, key: &Q) -> Option<Handle<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(&idx) = self.map.get(key) else {
            self.stats.record_miss();
            return None;
        };

        let entry = match &self.nodes[idx] {
            Some(node) => Arc::clone(&node.entry),
            None => {
                // map and slots change together in remove_indexed/insert
                debug_assert!(false, "indexed key points at an empty slot");
                self.stats.record_miss();
                return None;
            }
        };
        self.move_to_front(idx);
        entry.acquire();
        self.stats.record_hit();
        Some(Handle::new(entry))
    }

    /// Give back a handle obtained from `insert` or `lookup`.
    ///
    /// When this drops the last reference to an entry that has already left
    /// the index, the entry is destroyed and its charge stops counting as
    /// detached usage.
    ///
    /// A handle issued by another cache is refused and handed back inside the
    /// [`ReleaseError`], still holding its reference.
    pub fn release(
        &mut self,
        handle: Handle<K, V>,
    ) -> std::result::Result<(), ReleaseError<K, V>> {
        if handle.entry.owner != self.id {
            let error = Error::ForeignHandle {
                handle_cache: handle.entry.owner,
                cache: self.id,
            };
            return Err(ReleaseError::new(error, handle));
        }

        let entry = handle.entry;
        if entry.unref() == 0 {
            // an indexed entry always keeps the index reference
            debug_assert!(!entry.is_cached());
            self.detached = self.detached.saturating_sub(entry.charge);
            trace!(cache = self.id, charge = entry.charge, "destroyed released entry");
        }
        Ok(())
    }

    /// Remove `key` from the cache. Returns false if it was not indexed.
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key) {
            Some(&idx) => {
                self.remove_indexed(idx);
                self.stats.record_erase();
                true
            }
            None => false,
        }
    }

    /// Drop every indexed entry that no caller holds a handle to.
    ///
    /// Returns the number of entries reclaimed. Entries with outstanding
    /// handles keep their place in the list.
    pub fn prune(&mut self) -> usize {
        let candidates: Vec<usize> = self
            .iter()
            .filter(|(_, entry)| entry.refs() == 1)
            .map(|(idx, _)| idx)
            .collect();

        for &idx in &candidates {
            self.remove_indexed(idx);
        }

        debug!(
            cache = self.id,
            pruned = candidates.len(),
            remaining = self.map.len(),
            "prune sweep"
        );
        self.stats.record_pruned(candidates.len());
        candidates.len()
    }

    /// Check whether `key` is indexed without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Indexed keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(_, entry)| entry.key.clone()).collect()
    }

    /// Erase every indexed entry. Outstanding handles stay valid.
    pub fn clear(&mut self) {
        while let Some(idx) = self.head {
            self.remove_indexed(idx);
        }
        self.nodes.clear();
        self.free_list.clear();
    }

    /// Human-readable report of usage, capacity and every entry
    pub fn debug_dump(&self) -> String
    where
        K: fmt::Debug,
    {
        self.to_string()
    }

    fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            next: self.head,
        }
    }

    fn evict_to_capacity(&mut self) {
        while self.usage > self.capacity {
            if !self.evict_lru() {
                break;
            }
        }
    }

    /// Evict the least recently used entry. Returns false if the list is empty.
    fn evict_lru(&mut self) -> bool {
        let Some(idx) = self.tail else {
            return false;
        };
        if let Some(node) = &self.nodes[idx] {
            trace!(
                cache = self.id,
                charge = node.entry.charge,
                refs = node.entry.refs(),
                "evicting lru entry"
            );
        }
        self.remove_indexed(idx);
        self.stats.record_eviction();
        true
    }

    /// Take an indexed entry out of both the list and the map, then drop the
    /// index's reference to it.
    fn remove_indexed(&mut self, idx: usize) {
        self.unlink(idx);
        let Some(node) = self.nodes[idx].take() else {
            return;
        };
        self.free_node(idx);

        let entry = node.entry;
        self.map.remove(&entry.key);
        self.usage -= entry.charge;
        entry.set_uncached();

        if entry.unref() > 0 {
            self.detached = self.detached.saturating_add(entry.charge);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);
        self.attach_front(idx);
    }

    fn attach_front(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

impl<K, V> Drop for LruCache<K, V> {
    fn drop(&mut self) {
        // Hand the index references back so surviving handles see the truth.
        for node in self.nodes.drain(..).flatten() {
            node.entry.set_uncached();
            node.entry.unref();
        }
    }
}

impl<K, V> fmt::Display for LruCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Usage: {}", self.usage)?;
        writeln!(f, "Capacity: {}", self.capacity)?;
        for (_, entry) in self.iter() {
            writeln!(
                f,
                "Key: {:?} refs: {} charge: {}",
                entry.key,
                entry.refs(),
                entry.charge
            )?;
        }
        Ok(())
    }
}

/// Walks the list from most to least recently used
struct Iter<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    next: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (usize, &'a Entry<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = self.nodes[idx].as_ref()?;
        self.next = node.next;
        Some((idx, &*node.entry))
    }
}
