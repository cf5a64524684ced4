//! In-memory TTL cache.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use book_exchange_core::cache::{Cache, CacheError, CacheFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Operation counters of an [`InMemoryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `get` calls that found a live entry.
    pub hits: usize,
    /// `get` calls that found nothing (absent or expired).
    pub misses: usize,
    /// `set` calls.
    pub sets: usize,
    /// `del` calls.
    pub dels: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (Vec<u8>, Instant)>,
    stats: CacheStats,
}

/// HashMap-backed cache that honours TTLs against tokio's clock.
///
/// Expiry uses [`tokio::time::Instant`], so tests running with a paused
/// runtime can advance time past a TTL.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<CacheState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while set, every operation fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a live entry exists for `key`. Does not count as a hit.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    /// Raw bytes stored under `key`, if live.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .unwrap()
            .entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(bytes, _)| bytes.clone())
    }

    /// Put bytes directly, bypassing stats and outage.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.state
            .write()
            .unwrap()
            .entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    /// Live keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .state
            .read()
            .unwrap()
            .entries
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Operation counters so far.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.state.read().unwrap().stats
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Cache for InMemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            let now = Instant::now();
            let live = match state.entries.get(key) {
                Some((bytes, expires)) if *expires > now => Some(bytes.clone()),
                Some(_) => {
                    state.entries.remove(key);
                    None
                }
                None => None,
            };
            if live.is_some() {
                state.stats.hits += 1;
            } else {
                state.stats.misses += 1;
            }
            Ok(live)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            state.stats.sets += 1;
            state
                .entries
                .insert(key.to_string(), (value, Instant::now() + ttl));
            Ok(())
        })
    }

    fn del<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            state.stats.dels += 1;
            for key in keys {
                state.entries.remove(key);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_after_set_hits() {
        let cache = InMemoryCache::new();
        cache.set("book:1", b"x".to_vec(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("book:1").await.unwrap(), Some(b"x".to_vec()));
        assert_eq!(cache.get("book:2").await.unwrap(), None);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = InMemoryCache::new();
        cache.set("books:all", b"[]".to_vec(), Duration::from_secs(300)).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;

        assert_eq!(cache.get("books:all").await.unwrap(), None);
        assert!(!cache.contains("books:all"));
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);

        assert!(cache.get("k").await.is_err());
        assert!(cache.set("k", Vec::new(), Duration::from_secs(1)).await.is_err());
        assert!(cache.del(&["k".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn del_ignores_missing_keys() {
        let cache = InMemoryCache::new();
        cache.insert_raw("a", b"1".to_vec(), Duration::from_secs(60));

        cache.del(&["a".to_string(), "missing".to_string()]).await.unwrap();

        assert!(cache.keys().is_empty());
    }
}
