// =============================================================================
// Redis-backed cache primitives (C3)
// =============================================================================
//
// Thin wrapper over `redis::aio::ConnectionManager`, which already handles
// reconnection on transient drops internally. The cache above treats any
// error surfacing here as grounds to fall back to the in-process LRU —
// this module never retries, it only translates `redis::RedisError` into
// [`CoreError::CacheBackend`].
// =============================================================================

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::CoreError;

/// Attempt to connect to `url`, with a `PING` round-trip bounded by
/// `timeout` to confirm the server actually answers rather than just
/// accepting a TCP connection.
pub async fn connect(url: &str, timeout: Duration) -> Result<ConnectionManager, CoreError> {
    let client = redis::Client::open(url)
        .map_err(|e| CoreError::CacheBackend(format!("invalid redis url: {e}")))?;

    let connect_fut = client.get_connection_manager();
    let mut manager = tokio::time::timeout(timeout, connect_fut)
        .await
        .map_err(|_| CoreError::CacheBackend("redis connection timed out".into()))?
        .map_err(|e| CoreError::CacheBackend(format!("redis connection failed: {e}")))?;

    let pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut manager))
        .await
        .map_err(|_| CoreError::CacheBackend("redis ping timed out".into()))?
        .map_err(|e| CoreError::CacheBackend(format!("redis ping failed: {e}")))?;

    if pong != "PONG" {
        return Err(CoreError::CacheBackend(format!("unexpected redis ping reply: {pong}")));
    }

    Ok(manager)
}

pub async fn get(conn: &mut ConnectionManager, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
    conn.get(key)
        .await
        .map_err(|e| CoreError::CacheBackend(format!("GET {key} failed: {e}")))
}

pub async fn set(
    conn: &mut ConnectionManager,
    key: &str,
    value: &[u8],
    ttl: Option<Duration>,
) -> Result<(), CoreError> {
    match ttl {
        Some(ttl) => {
            let secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(key, value, secs)
                .await
                .map_err(|e| CoreError::CacheBackend(format!("SETEX {key} failed: {e}")))
        }
        None => conn
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| CoreError::CacheBackend(format!("SET {key} failed: {e}"))),
    }
}

pub async fn delete(conn: &mut ConnectionManager, key: &str) -> Result<(), CoreError> {
    conn.del::<_, ()>(key)
        .await
        .map_err(|e| CoreError::CacheBackend(format!("DEL {key} failed: {e}")))
}

pub async fn delete_by_prefix(conn: &mut ConnectionManager, prefix: &str) -> Result<(), CoreError> {
    let pattern = format!("{prefix}*");
    let keys: Vec<String> = conn
        .keys(&pattern)
        .await
        .map_err(|e| CoreError::CacheBackend(format!("KEYS {pattern} failed: {e}")))?;

    if keys.is_empty() {
        return Ok(());
    }

    conn.del::<_, ()>(keys)
        .await
        .map_err(|e| CoreError::CacheBackend(format!("DEL by prefix {prefix} failed: {e}")))
}

pub async fn clear(conn: &mut ConnectionManager) -> Result<(), CoreError> {
    redis::cmd("FLUSHDB")
        .query_async::<_, ()>(conn)
        .await
        .map_err(|e| CoreError::CacheBackend(format!("FLUSHDB failed: {e}")))
}
