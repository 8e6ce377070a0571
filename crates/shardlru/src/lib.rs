//! # shardlru
//!
//! Capacity-bounded LRU cache with reference-counted handles.
//!
//! ## Architecture
//! - **Index**: AHash map from key to list slot (O(1) lookup)
//! - **LRU List**: Doubly-linked list over a slot arena (O(1) touch and eviction)
//! - **Handles**: Counted references that keep an entry readable after eviction
//! - **Sharding**: Keys hashed onto independently locked shards
//!
//! Capacity is measured in caller-chosen *charge* units rather than entry
//! counts. An insert never fails; the shard evicts least recently used
//! entries afterwards until its usage fits again.
//!
//! ```
//! use shardlru::LruCache;
//!
//! let mut cache = LruCache::new(2);
//! let held = cache.insert(1, "one");
//! for key in 2..=3 {
//!     let handle = cache.insert(key, "other");
//!     cache.release(handle).unwrap();
//! }
//!
//! // Key 1 was evicted, but the handle still reads it.
//! assert!(!cache.contains(&1));
//! assert_eq!(*held.value(), "one");
//! cache.release(held).unwrap();
//! ```

#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod lru;
mod sharded;
mod stats;

pub use config::{ShardedConfig, DEFAULT_SHARD_BITS, MAX_SHARD_BITS};
pub use entry::Handle;
pub use error::{Error, ReleaseError, Result};
pub use lru::LruCache;
pub use sharded::ShardedLruCache;
pub use stats::CacheStats;
