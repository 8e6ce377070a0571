//! Construction settings for [`ShardedLruCache`](crate::ShardedLruCache)

use crate::error::{Error, Result};

/// Default shard bit count (16 shards)
pub const DEFAULT_SHARD_BITS: u32 = 4;

/// Largest accepted shard bit count (1024 shards)
pub const MAX_SHARD_BITS: u32 = 10;

const DEFAULT_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Settings for a sharded cache.
///
/// # Example
///
/// ```
/// use shardlru::{ShardedConfig, ShardedLruCache};
///
/// let config = ShardedConfig::new(100).shard_bits(2);
/// assert_eq!(config.shard_capacity(), 25);
///
/// let cache: ShardedLruCache<u64, String> = ShardedLruCache::with_config(config).unwrap();
/// assert_eq!(cache.shard_count(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardedConfig {
    capacity: usize,
    shard_bits: u32,
    seeds: [u64; 4],
}

impl ShardedConfig {
    /// Settings for `capacity` total charge units, split over the default 16 shards
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            shard_bits: DEFAULT_SHARD_BITS,
            seeds: DEFAULT_SEEDS,
        }
    }

    /// Use `1 << bits` shards
    pub fn shard_bits(mut self, bits: u32) -> Self {
        self.shard_bits = bits;
        self
    }

    /// Seeds for the key hasher. Routing is stable for a given seed set.
    pub fn seeds(mut self, seeds: [u64; 4]) -> Self {
        self.seeds = seeds;
        self
    }

    /// Requested total capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        1 << self.shard_bits
    }

    /// Capacity given to each shard, rounded up so the total never falls short
    pub fn shard_capacity(&self) -> usize {
        self.capacity.div_ceil(self.shard_count())
    }

    pub(crate) fn hash_seeds(&self) -> [u64; 4] {
        self.seeds
    }

    /// Check the settings
    pub fn validate(&self) -> Result<()> {
        if self.shard_bits > MAX_SHARD_BITS {
            return Err(Error::InvalidShardBits(self.shard_bits));
        }
        Ok(())
    }
}
