//! In-memory LLM response cache with TTL expiry.
//!
//! Avoids redundant calls to the quota-limited generation API for
//! identical prompts within the freshness window. The cache key is a
//! SHA-256 digest of the prompt, never the prompt itself — keys stay
//! fixed-length regardless of prompt size. Entries expire lazily on
//! access; [`ResponseCache::cleanup_expired`] exists for a periodic
//! maintenance task but is not required for correctness.
//!
//! All methods take `&self`; a single internal mutex guards the map, and
//! every critical section is O(1) map work with no I/O.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// A single cached generation response.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The generation response text.
    response: String,
    /// When the entry was inserted.
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Thread-safe response cache with TTL-based invalidation.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        info!(ttl_secs = ttl.as_secs(), "initialized response cache");
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
        }
    }

    /// Deterministic fixed-length cache key: SHA-256 hex digest of the
    /// prompt bytes. An empty prompt is a valid (always-hashable) key.
    pub fn fingerprint(prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached response. Returns `None` if absent or expired.
    ///
    /// An expired entry is removed on the spot and counts as a miss; an
    /// entry is expired once its age reaches the TTL.
    pub fn get(&self, prompt: &str) -> Option<String> {
        let key = Self::fingerprint(prompt);
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // Check liveness with an immutable borrow first to avoid
        // overlapping borrows when mutating counters below.
        let live = inner
            .entries
            .get(&key)
            .map(|e| e.inserted_at.elapsed() < self.ttl);

        if let Some(true) = live {
            inner.hits += 1;
            debug!(
                key = %&key[..16],
                hits = inner.hits,
                misses = inner.misses,
                "cache hit"
            );
            return inner.entries.get(&key).map(|e| e.response.clone());
        }

        if let Some(false) = live {
            inner.entries.remove(&key);
            debug!(key = %&key[..16], "cache entry expired, removing");
        }

        inner.misses += 1;
        debug!(
            key = %&key[..16],
            hits = inner.hits,
            misses = inner.misses,
            "cache miss"
        );
        None
    }

    /// Store a response, overwriting any prior entry for the same prompt.
    pub fn set(&self, prompt: &str, response: &str) {
        let key = Self::fingerprint(prompt);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                response: response.to_string(),
                inserted_at: Instant::now(),
            },
        );
        debug!(key = %&key[..16], size = inner.entries.len(), "cached response");
    }

    /// Drop all entries and zero the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        info!("cache cleared");
    }

    /// Remove every entry whose age has reached the TTL; returns the count
    /// removed. Intended for a periodic maintenance task.
    pub fn cleanup_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        let removed = before - inner.entries.len();
        if removed > 0 {
            info!(removed, "cleaned up expired cache entries");
        }
        removed
    }

    /// Point-in-time cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            inner.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            hit_rate_percent: (hit_rate * 100.0).round() / 100.0,
        }
    }

    #[cfg(test)]
    fn backdate(&self, prompt: &str, age: Duration) {
        let key = Self::fingerprint(prompt);
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.inserted_at -= age;
        }
    }
}

/// Aggregate cache statistics for the observability surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Number of entries currently stored.
    pub size: usize,
    /// `hits / (hits + misses) * 100`, rounded to two decimals; `0.0`
    /// before any lookup.
    pub hit_rate_percent: f64,
}
