//! Key/value cache with TTL.
//!
//! The cache holds serialised entity snapshots and list snapshots. It is never
//! authoritative: every failure here degrades to a store read or is logged.
//!
//! # Keys
//!
//! Keys have the shape `<family>:<selector>`, where the selector is a hex id
//! or a list qualifier (`all`, `pending`, `genre:<g>`, `user:<uid>`, ...).
//! Build them with [`key`] so families never collide.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A snapshot could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Upper bounds on how long a snapshot may live.
///
/// Writes invalidate sooner.
pub mod ttl {
    use std::time::Duration;

    /// Single entities.
    pub const ENTITY: Duration = Duration::from_secs(15 * 60);
    /// Lists that change on most writes (all-books, pending offers).
    pub const VOLATILE_LIST: Duration = Duration::from_secs(5 * 60);
    /// Lists filtered by author, genre, language, user or status.
    pub const FILTER_LIST: Duration = Duration::from_secs(10 * 60);
    /// Top-rated books.
    pub const TOP_RATED: Duration = Duration::from_secs(15 * 60);
    /// New arrivals and recommendations.
    pub const SLOW_LIST: Duration = Duration::from_secs(30 * 60);
}

/// Build a cache key from a family and a selector.
#[must_use]
pub fn key(family: &str, selector: impl std::fmt::Display) -> String {
    format!("{family}:{selector}")
}

/// Boxed future returned by cache operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Cache abstraction.
///
/// Values are opaque bytes; the repository decides the encoding.
///
/// # Implementations
///
/// - `RedisCache` (in `book-exchange-redis`)
/// - `InMemoryCache` (in `book-exchange-testing`)
pub trait Cache: Send + Sync {
    /// Look up a key. Expired entries are reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache cannot be reached.
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache cannot be reached.
    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()>;

    /// Remove keys. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache cannot be reached.
    fn del<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, ()>;
}

/// Typed JSON access on top of any [`Cache`].
///
/// A stored `null` reads back as absent, so an entry can never decode into a
/// phantom value. Lists are just `V = Vec<T>`; an empty array is a hit.
pub trait CacheExt: Cache {
    /// Look up and decode a JSON snapshot.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Unavailable`] if the cache cannot be reached
    /// - [`CacheError::Serialization`] if the entry does not decode as `V`
    fn get_json<'a, V>(&'a self, key: &'a str) -> CacheFuture<'a, Option<V>>
    where
        V: DeserializeOwned + Send + 'a,
    {
        Box::pin(async move {
            let Some(bytes) = self.get(key).await? else {
                return Ok(None);
            };
            serde_json::from_slice::<Option<V>>(&bytes)
                .map_err(|e| CacheError::Serialization(e.to_string()))
        })
    }

    /// Encode `value` as JSON and store it with a TTL.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Serialization`] if `value` cannot be encoded
    /// - [`CacheError::Unavailable`] if the cache cannot be reached
    fn set_json<'a, V>(&'a self, key: &'a str, value: &V, ttl: Duration) -> CacheFuture<'a, ()>
    where
        V: Serialize + ?Sized,
    {
        let encoded = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()));
        Box::pin(async move { self.set(key, encoded?, ttl).await })
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_family_prefixed() {
        assert_eq!(key("book", "abc"), "book:abc");
        assert_eq!(key("books", "genre:sci-fi"), "books:genre:sci-fi");
    }

    #[test]
    fn ttl_classes_are_ordered() {
        assert!(ttl::VOLATILE_LIST < ttl::FILTER_LIST);
        assert!(ttl::FILTER_LIST < ttl::TOP_RATED);
        assert!(ttl::TOP_RATED < ttl::SLOW_LIST);
        assert_eq!(ttl::ENTITY, Duration::from_secs(900));
    }
}
