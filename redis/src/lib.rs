//! Redis cache for the Book Exchange cache-aside repository.
//!
//! Snapshots are stored as plain string values with a per-key expiry
//! (`SET key value EX ttl`). Invalidation is a single multi-key `DEL`.
//!
//! # Example
//!
//! ```no_run
//! use book_exchange_redis::RedisCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use book_exchange_core::cache::{Cache, CacheError, CacheFuture};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Redis-backed [`Cache`].
///
/// Cloning is cheap: clones share one `ConnectionManager`, which reconnects
/// on its own after the server drops the connection.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the URL is invalid or the
    /// first connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis cache");
        Ok(Self { conn_manager })
    }
}

/// Redis rejects `EX 0`; anything shorter than a second is rounded up.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl Cache for RedisCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key)
                .await
                .map_err(|e| CacheError::Unavailable(format!("GET {key}: {e}")))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.set_ex(key, value, ttl_seconds(ttl))
                .await
                .map_err(|e| CacheError::Unavailable(format!("SET {key}: {e}")))
        })
    }

    fn del<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn_manager.clone();
            conn.del(keys)
                .await
                .map_err(|e| CacheError::Unavailable(format!("DEL {keys:?}: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_cache_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedisCache>();
    }

    #[test]
    fn sub_second_ttl_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }
}
