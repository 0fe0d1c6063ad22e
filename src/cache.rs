//! Rewrite cache.
//!
//! Holds rewritten header blobs keyed by flow and sequence number until the
//! matching packet consumes them. Bounded in size, with a per-entry lifetime.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::FiveTuple;

/// Cache key for the rewrite cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    flow_hash: u64,
    seq: u32,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tuple: FiveTuple,
    rewrite: Vec<u8>,
    inserted: Instant,
}

/// Bounded, expiring store of header rewrites.
pub struct RewriteCache {
    cache: Mutex<LruCache<CacheKey, CacheEntry>>,
    timeout: Duration,
    hasher: RandomState,
}

impl RewriteCache {
    pub fn new(size: usize, timeout: Duration) -> Self {
        let size = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(size)),
            timeout,
            hasher: RandomState::new(),
        }
    }

    fn key(&self, tuple: &FiveTuple, seq: u32) -> CacheKey {
        CacheKey {
            flow_hash: self.hasher.hash_one(tuple),
            seq,
        }
    }

    /// Store `rewrite` for (`tuple`, `seq`). Evicts the oldest entry when full.
    pub fn insert(&self, tuple: FiveTuple, seq: u32, rewrite: Vec<u8>, now: Instant) {
        let key = self.key(&tuple, seq);
        self.cache.lock().put(
            key,
            CacheEntry {
                tuple,
                rewrite,
                inserted: now,
            },
        );
    }

    /// Remove and return the rewrite for (`tuple`, `seq`) if it is still fresh.
    pub fn take(&self, tuple: &FiveTuple, seq: u32, now: Instant) -> Option<Vec<u8>> {
        let key = self.key(tuple, seq);
        let mut cache = self.cache.lock();
        // Hash collisions are resolved by comparing the stored tuple.
        if cache.peek(&key)?.tuple != *tuple {
            return None;
        }
        let entry = cache.pop(&key)?;
        if now.saturating_duration_since(entry.inserted) > self.timeout {
            return None;
        }
        Some(entry.rewrite)
    }

    /// Drop every entry older than the timeout. Returns how many were dropped.
    pub fn expire(&self, now: Instant) -> usize {
        let mut cache = self.cache.lock();
        let mut removed = 0;
        // Entries are never promoted, so LRU order is insertion order.
        while let Some((_, entry)) = cache.peek_lru() {
            if now.saturating_duration_since(entry.inserted) <= self.timeout {
                break;
            }
            cache.pop_lru();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}
