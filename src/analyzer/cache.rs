//! Tick cache (§4.2): keyed by `(pool_address, current_tick_bucket)` so a
//! pool's cached tick window survives small in-range price moves but is
//! invalidated once the price has moved far enough that the cached ticks
//! no longer bracket the current price. TTL 30s, evicted entirely at
//! `2 * TTL`.

use crate::types::{Tick, TickCacheEntry};
use alloy::primitives::Address;
use dashmap::DashMap;
use std::time::Instant;

/// Buckets ticks into windows of `bucket_size` so nearby ticks share a
/// cache entry.
fn tick_bucket(tick: i32, bucket_size: i32) -> i32 {
    if bucket_size <= 0 {
        return tick;
    }
    tick.div_euclid(bucket_size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    pool: Address,
    bucket: i32,
}

pub struct TickCache {
    entries: DashMap<CacheKey, TickCacheEntry>,
    bucket_size: i32,
    ttl_secs: u64,
}

impl TickCache {
    pub fn new(bucket_size: i32, ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            bucket_size,
            ttl_secs,
        }
    }

    /// Returns the cached ticks for `pool` at `current_tick` if present and
    /// not expired.
    pub fn get(&self, pool: Address, current_tick: i32) -> Option<Vec<Tick>> {
        let key = CacheKey {
            pool,
            bucket: tick_bucket(current_tick, self.bucket_size),
        };
        let entry = self.entries.get(&key)?;
        if entry.is_expired(self.ttl_secs, Instant::now()) {
            None
        } else {
            Some(entry.ticks.clone())
        }
    }

    pub fn insert(&self, pool: Address, current_tick: i32, ticks: Vec<Tick>) {
        let key = CacheKey {
            pool,
            bucket: tick_bucket(current_tick, self.bucket_size),
        };
        self.entries.insert(key, TickCacheEntry::new(ticks));
    }

    /// Drops every entry older than `2 * ttl_secs`, regardless of bucket.
    pub fn evict_stale(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| !entry.should_evict(self.ttl_secs, now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
