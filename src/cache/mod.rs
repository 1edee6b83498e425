// =============================================================================
// Cache (C3)
// =============================================================================
//
// Redis-backed key/value cache with automatic, one-way fallback to an
// in-process LRU. Construction probes Redis with a bounded `PING`; if that
// fails, or if a later call hits a Redis error, the cache permanently
// switches to the LRU backend and logs the switch once at warn level
// (spec.md §4.3). There is no path back to Redis without restarting the
// process — the in-process-persistence tradeoffs of trying to "heal" back
// aren't worth the added state machine.
// =============================================================================

pub mod lru_backend;
pub mod redis_backend;
pub mod tabular;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::CoreError;
use lru_backend::LruBackend;

pub use tabular::{bars_to_tabular, tabular_to_bars, TabularValue};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-with-LRU-fallback cache. Cheap to clone: everything behind an
/// `Arc` or shared by reference, per the caller's choice — the fields
/// themselves are already interior-mutable.
pub struct Cache {
    redis: Mutex<Option<ConnectionManager>>,
    lru: LruBackend,
    using_redis: AtomicBool,
}

impl Cache {
    /// Construct a cache, probing `redis_url` if given. Falls back to the
    /// in-process LRU immediately (no error) if `redis_url` is `None` or
    /// unreachable.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let redis = match redis_url {
            Some(url) => match redis_backend::connect(url, REDIS_CONNECT_TIMEOUT).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    warn!(error = %e, "redis unreachable at startup, falling back to in-process LRU cache");
                    None
                }
            },
            None => None,
        };

        let using_redis = redis.is_some();
        Self {
            redis: Mutex::new(redis),
            lru: LruBackend::new(),
            using_redis: AtomicBool::new(using_redis),
        }
    }

    pub fn is_available(&self) -> bool {
        true
    }

    /// `true` while still backed by Redis; `false` once fallen back to LRU.
    pub fn using_redis(&self) -> bool {
        self.using_redis.load(Ordering::Relaxed)
    }

    fn fall_back(&self, reason: &CoreError) {
        if self.using_redis.swap(false, Ordering::SeqCst) {
            warn!(error = %reason, "redis connection error, falling back to in-process LRU cache permanently");
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        if self.using_redis() {
            let mut guard = self.redis.lock();
            if let Some(conn) = guard.as_mut() {
                match redis_backend::get(conn, key).await {
                    Ok(v) => return Ok(v),
                    Err(e) => {
                        drop(guard);
                        self.fall_back(&e);
                    }
                }
            }
        }
        Ok(self.lru.get(key))
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<(), CoreError> {
        let ttl = ttl_seconds.map(Duration::from_secs);
        if self.using_redis() {
            let mut guard = self.redis.lock();
            if let Some(conn) = guard.as_mut() {
                match redis_backend::set(conn, key, value, ttl).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        drop(guard);
                        self.fall_back(&e);
                    }
                }
            }
        }
        self.lru.set(key, value.to_vec(), ttl);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CoreError> {
        if self.using_redis() {
            let mut guard = self.redis.lock();
            if let Some(conn) = guard.as_mut() {
                match redis_backend::delete(conn, key).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        drop(guard);
                        self.fall_back(&e);
                    }
                }
            }
        }
        self.lru.delete(key);
        Ok(())
    }

    pub async fn delete_by_pattern(&self, prefix: &str) -> Result<(), CoreError> {
        if self.using_redis() {
            let mut guard = self.redis.lock();
            if let Some(conn) = guard.as_mut() {
                match redis_backend::delete_by_prefix(conn, prefix).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        drop(guard);
                        self.fall_back(&e);
                    }
                }
            }
        }
        self.lru.delete_by_prefix(prefix);
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CoreError> {
        if self.using_redis() {
            let mut guard = self.redis.lock();
            if let Some(conn) = guard.as_mut() {
                match redis_backend::clear(conn).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        drop(guard);
                        self.fall_back(&e);
                    }
                }
            }
        }
        self.lru.clear();
        Ok(())
    }
}

/// Compute the cache key for [`cache_with_ttl`]: `hantu:cache:<prefix>:<first
/// 16 hex chars of sha256(json(args))>`.
pub fn derive_key(prefix: &str, args: &impl Serialize) -> Result<String, CoreError> {
    let json = serde_json::to_vec(args)
        .map_err(|e| CoreError::CacheBackend(format!("failed to serialize cache key args: {e}")))?;
    let digest = Sha256::digest(&json);
    let hex = hex::encode(digest);
    Ok(format!("hantu:cache:{prefix}:{}", &hex[..16]))
}

/// Decorator-style caching (spec.md §4.3): on a hit, deserialize and return
/// the cached value; on a miss, call `f`, cache the JSON-serialized result
/// under TTL, and return it. A serialization failure on the write path logs
/// once at error level and returns the freshly computed value uncached —
/// it never leaves a partial entry behind.
pub async fn cache_with_ttl<T, F, Fut>(
    cache: &Cache,
    prefix: &str,
    ttl_seconds: u64,
    args: &impl Serialize,
    f: F,
) -> Result<T, CoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let key = derive_key(prefix, args)?;

    if let Some(raw) = cache.get(&key).await? {
        if let Ok(value) = serde_json::from_slice::<T>(&raw) {
            return Ok(value);
        }
        warn!(key, "cached value failed to deserialize, treating as a miss");
    }

    let value = f().await?;

    match serde_json::to_vec(&value) {
        Ok(raw) => {
            cache.set(&key, &raw, Some(ttl_seconds)).await?;
        }
        Err(e) => {
            tracing::error!(key, error = %e, "failed to serialize value for caching, returning uncached result");
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_stable_for_same_args() {
        let a = derive_key("rsi", &("005930", 14)).unwrap();
        let b = derive_key("rsi", &("005930", 14)).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("hantu:cache:rsi:"));
    }

    #[test]
    fn derive_key_differs_for_different_args() {
        let a = derive_key("rsi", &("005930", 14)).unwrap();
        let b = derive_key("rsi", &("005930", 21)).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn lru_only_cache_serves_get_and_set() {
        let cache = Cache::connect(None).await;
        assert!(!cache.using_redis());

        cache.set("k", b"v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_with_ttl_recomputes_on_miss_and_hits_thereafter() {
        let cache = Cache::connect(None).await;
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<i64, CoreError>(42)
        };

        let first: i64 = cache_with_ttl(&cache, "answer", 60, &(), compute).await.unwrap();
        let second: i64 = cache_with_ttl(&cache, "answer", 60, &(), compute).await.unwrap();

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
