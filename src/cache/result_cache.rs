use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::query::GraphResult;

struct CachedResult {
    result: GraphResult,
    inserted_at: Instant,
    generation: u64,
}

/// Thread-safe, size-bounded cache of query results with a time-to-live
///
/// Lookups do not refresh recency, so when the cache is full the oldest
/// insertion is evicted. Each entry remembers the store generation it was
/// computed against; an entry from an older generation is stale and is
/// dropped on lookup, the same as an expired one.
pub struct ResultCache {
    entries: Mutex<LruCache<String, CachedResult>>,
    ttl: Duration,
}

/// Hex SHA-256 of a normalised query signature.
pub fn cache_key(signature: &str) -> String {
    format!("{:x}", Sha256::digest(signature.as_bytes()))
}

impl ResultCache {
    /// Create a cache holding at most `capacity` results (minimum 1) for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Get a cached result
    ///
    /// Returns None if the key is absent, the entry has outlived the TTL, or
    /// it was computed against a different store generation.
    pub fn get(&self, key: &str, generation: u64) -> Option<GraphResult> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = match entries.peek(key) {
            Some(entry) => {
                entry.generation == generation && entry.inserted_at.elapsed() < self.ttl
            }
            None => return None,
        };

        if fresh {
            entries.peek(key).map(|entry| entry.result.clone())
        } else {
            entries.pop(key);
            None
        }
    }

    /// Store a result computed against store `generation`
    pub fn put(&self, key: String, result: GraphResult, generation: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(
                key,
                CachedResult {
                    result,
                    inserted_at: Instant::now(),
                    generation,
                },
            );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
