// =============================================================================
// cache.rs — THE "WE JUST LOOKED THAT UP" CACHE
// =============================================================================
//
// Maps a normalized tracking value to the last result that won a race for
// it, plus when it was stored. Entries expire after the TTL (30 minutes by
// default), but nobody sweeps them: expiry is checked when an entry is read
// and a stale entry is evicted right there.
//
// An LRU bound sits on top so a very long-lived process that looks up
// thousands of values doesn't grow forever.
//
// Timestamps use tokio's clock so tests can fast-forward half an hour
// without actually waiting for it.
// =============================================================================

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::models::TrackingResult;

struct CacheEntry {
    result: TrackingResult,
    stored_at: Instant,
}

pub struct LookupCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    stats: CacheStats,
}

struct CacheStats {
    hits: portable_atomic::AtomicU64,
    misses: portable_atomic::AtomicU64,
    expired: portable_atomic::AtomicU64,
    writes: portable_atomic::AtomicU64,
}

impl CacheStats {
    fn new() -> Self {
        Self {
            hits: portable_atomic::AtomicU64::new(0),
            misses: portable_atomic::AtomicU64::new(0),
            expired: portable_atomic::AtomicU64::new(0),
            writes: portable_atomic::AtomicU64::new(0),
        }
    }
}

/// Cache key normalization: `" abcu1234567"` and `"ABCU1234567"` are the
/// same lookup.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_uppercase()
}

impl LookupCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: CacheStats::new(),
        }
    }

    /// A non-expired result for `value`, with its original `fetched_at`.
    pub fn get(&self, value: &str) -> Option<TrackingResult> {
        use portable_atomic::Ordering;

        let key = normalize_key(value);
        let mut entries = self.entries.lock();

        let lookup = entries
            .get(&key)
            .map(|entry| (entry.stored_at.elapsed() < self.ttl).then(|| entry.result.clone()));

        let fresh = match lookup {
            Some(Some(result)) => Some(result),
            Some(None) => {
                entries.pop(&key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache entry expired, evicted on read");
                None
            }
            None => None,
        };

        match &fresh {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        fresh
    }

    /// Store (or replace) the result for `value`.
    pub fn put(&self, value: &str, result: TrackingResult) {
        let key = normalize_key(value);
        self.entries.lock().put(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
        self.stats
            .writes
            .fetch_add(1, portable_atomic::Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        use portable_atomic::Ordering;
        CacheSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            expired: self.stats.expired.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub writes: u64,
    pub entries: usize,
}
