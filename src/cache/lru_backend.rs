// =============================================================================
// In-process LRU fallback backend (C3)
// =============================================================================
//
// Used when Redis is unreachable at construction time, or after the cache
// transitions one-way into fallback mode following a Redis connection
// error. Capacity is fixed at 1000 entries (spec.md §4.3); expiry is
// checked lazily on read rather than with a background sweep, matching the
// teacher's preference for no ambient background tasks beyond the ones
// `main.rs` explicitly spawns.
// =============================================================================

use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

pub const LRU_CAPACITY: usize = 1000;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

pub struct LruBackend {
    inner: Mutex<LruCache<String, Entry>>,
}

impl LruBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(LRU_CAPACITY).expect("LRU_CAPACITY is nonzero"),
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock();
        let expired = match cache.peek(key) {
            Some(entry) => matches!(entry.expires_at, Some(t) if Instant::now() >= t),
            None => return None,
        };
        if expired {
            cache.pop(key);
            return None;
        }
        cache.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<std::time::Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.inner.lock().put(key.to_string(), Entry { value, expires_at });
    }

    pub fn delete(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    pub fn delete_by_prefix(&self, prefix: &str) {
        let mut cache = self.inner.lock();
        let matching: Vec<String> = cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for k in matching {
            cache.pop(&k);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for LruBackend {
    fn default() -> Self {
        Self::new()
    }
}
