//! Cache-aside repository.
//!
//! [`CachedRepository`] is the only surface business logic uses to reach its
//! data. It composes a [`DocumentStore`] (authoritative) with a [`Cache`]
//! (best effort) and implements the cache-aside protocol:
//!
//! ```text
//! read:   cache ──hit──▶ return
//!           │
//!          miss / undecodable
//!           ▼
//!         store ──found──▶ populate cache (detached, TTL) ──▶ return
//!           │
//!         absent ──▶ NotFound
//!
//! write:  store (returns post-image)
//!           │ ok                      │ err
//!           ▼                         ▼
//!         invalidate keys           propagate, cache untouched
//!         (detached, awaited)
//!           ▼
//!         return post-image
//! ```
//!
//! Invalidation runs on a detached task that the write awaits: the keys are
//! gone before the write returns, and they still go if the caller is
//! cancelled while waiting. A concurrent reader can repopulate a key with a
//! value read just before the commit became visible; that staleness is bounded
//! by the key's TTL.

use crate::cache::{self, Cache, CacheError, CacheExt};
use crate::detached::Detached;
use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::query::{Filter, Query, Update};
use crate::store::{CollectionSpec, DocumentStore, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An entity stored by a [`CachedRepository`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Cache family for single-entity keys; also the entity name in errors.
    const FAMILY: &'static str;

    /// Collection the entity lives in.
    const COLLECTION: CollectionSpec;

    /// The entity's id.
    fn id(&self) -> ObjectId;
}

/// A cached list: its key and how long a snapshot may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListKey {
    /// Full cache key.
    pub key: String,
    /// Snapshot lifetime.
    pub ttl: Duration,
}

impl ListKey {
    /// Build a list key from family, selector and TTL class.
    #[must_use]
    pub fn new(family: &str, selector: impl std::fmt::Display, ttl: Duration) -> Self {
        Self {
            key: cache::key(family, selector),
            ttl,
        }
    }
}

/// Store + cache composition for one entity family.
pub struct CachedRepository<T> {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn Cache>,
    detached: Detached,
    entity_ttl: Duration,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CachedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            detached: self.detached,
            entity_ttl: self.entity_ttl,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> CachedRepository<T> {
    /// Create a repository with the default entity TTL and detached-task timeout.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            detached: Detached::default(),
            entity_ttl: cache::ttl::ENTITY,
            _entity: PhantomData,
        }
    }

    /// Override the single-entity TTL.
    #[must_use]
    pub const fn with_entity_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl = ttl;
        self
    }

    /// Override the timeout of detached cache work.
    #[must_use]
    pub const fn with_detached(mut self, detached: Detached) -> Self {
        self.detached = detached;
        self
    }

    /// Cache key of a single entity.
    #[must_use]
    pub fn entity_key(id: &ObjectId) -> String {
        cache::key(T::FAMILY, id)
    }

    /// Read by id through the cache.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the store has no such entity
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get(&self, id: &ObjectId) -> Result<T> {
        let key = Self::entity_key(id);
        if let Some(hit) = self.lookup::<T>(&key).await {
            return Ok(hit);
        }

        let doc = self
            .store
            .find_by_id(&T::COLLECTION, id)
            .await
            .map_err(|e| store_failure(T::FAMILY, "find_by_id", e))?
            .ok_or_else(|| Error::not_found(T::FAMILY, id))?;
        let entity: T = decode(doc)?;

        self.populate(key, &entity, self.entity_ttl);
        Ok(entity)
    }

    /// Read a list through the cache.
    ///
    /// An empty list is a legitimate cached value; an absent or `null` entry
    /// is a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list(&self, list: &ListKey, query: &Query) -> Result<Vec<T>> {
        if let Some(hit) = self.lookup::<Vec<T>>(&list.key).await {
            return Ok(hit);
        }

        let items = self.find_uncached(query).await?;
        self.populate(list.key.clone(), &items, list.ttl);
        Ok(items)
    }

    /// Query the store directly, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn find_uncached(&self, query: &Query) -> Result<Vec<T>> {
        self.store
            .find(&T::COLLECTION, query)
            .await
            .map_err(|e| store_failure(T::FAMILY, "find", e))?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Read one entity straight from the store.
    ///
    /// Write paths use this to see the committed pre-image.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the store has no such entity
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_uncached(&self, id: &ObjectId) -> Result<T> {
        let doc = self
            .store
            .find_by_id(&T::COLLECTION, id)
            .await
            .map_err(|e| store_failure(T::FAMILY, "find_by_id", e))?
            .ok_or_else(|| Error::not_found(T::FAMILY, id))?;
        decode(doc)
    }

    /// Insert a new entity and invalidate the lists it joins.
    ///
    /// `invalidate` receives the stored record (with its assigned id).
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] on unique-field violation
    /// - [`Error::InvalidArgument`] if `draft` is not an object
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn insert<D, F>(&self, draft: &D, invalidate: F) -> Result<T>
    where
        D: Serialize + Sync,
        F: FnOnce(&T) -> Vec<String>,
    {
        let doc = serde_json::to_value(draft)
            .map_err(|e| Error::InvalidArgument(format!("unencodable {}: {e}", T::FAMILY)))?;
        let stored = self
            .store
            .insert(&T::COLLECTION, doc)
            .await
            .map_err(|e| store_failure(T::FAMILY, "insert", e))?;
        let entity: T = decode(stored)?;

        self.invalidate(invalidate(&entity)).await;
        tracing::debug!(family = T::FAMILY, id = %entity.id(), "Entity inserted");
        Ok(entity)
    }

    /// Apply `update` to an existing entity.
    ///
    /// Invalidates the entity key plus whatever `invalidate` derives from the
    /// post-image.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the entity is absent
    /// - [`Error::Conflict`] on unique-field violation
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn modify<F>(&self, id: &ObjectId, update: &Update, invalidate: F) -> Result<T>
    where
        F: FnOnce(&T) -> Vec<String>,
    {
        self.modify_where(id, &Filter::All, update, invalidate)
            .await?
            .ok_or_else(|| Error::not_found(T::FAMILY, id))
    }

    /// Apply `update` only if the entity also matches `guard`.
    ///
    /// Returns `Ok(None)` when the entity is absent or the guard rejected it;
    /// the cache is untouched in that case.
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] on unique-field violation
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn modify_where<F>(
        &self,
        id: &ObjectId,
        guard: &Filter,
        update: &Update,
        invalidate: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&T) -> Vec<String>,
    {
        let Some(doc) = self
            .store
            .find_and_modify(&T::COLLECTION, id, guard, update)
            .await
            .map_err(|e| store_failure(T::FAMILY, "find_and_modify", e))?
        else {
            return Ok(None);
        };
        let entity: T = decode(doc)?;

        let mut keys = invalidate(&entity);
        keys.push(Self::entity_key(id));
        self.invalidate(keys).await;
        Ok(Some(entity))
    }

    /// Delete an entity, returning its last state.
    ///
    /// Invalidates the entity key plus whatever `invalidate` derives from the
    /// removed record.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the entity is absent
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn delete<F>(&self, id: &ObjectId, invalidate: F) -> Result<T>
    where
        F: FnOnce(&T) -> Vec<String>,
    {
        let doc = self
            .store
            .delete(&T::COLLECTION, id)
            .await
            .map_err(|e| store_failure(T::FAMILY, "delete", e))?
            .ok_or_else(|| Error::not_found(T::FAMILY, id))?;
        let entity: T = decode(doc)?;

        let mut keys = invalidate(&entity);
        keys.push(Self::entity_key(id));
        self.invalidate(keys).await;
        Ok(entity)
    }

    /// Remove keys from the cache.
    ///
    /// Runs detached and is awaited, so the keys are gone before this returns
    /// and the removal completes even if the caller is cancelled meanwhile.
    /// Failures are logged only.
    pub async fn invalidate(&self, mut keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        keys.sort();
        keys.dedup();

        let cache = Arc::clone(&self.cache);
        let family = T::FAMILY;
        let handle = self.detached.spawn("cache-invalidate", async move {
            let started = Instant::now();
            let result = cache.del(&keys).await;
            record_operation(family, "del", started);
            match result {
                Ok(()) => tracing::debug!(family, keys = ?keys, "Cache keys invalidated"),
                Err(e) => tracing::warn!(family, keys = ?keys, error = %e, "Cache invalidation failed"),
            }
        });
        if let Err(e) = handle.await {
            tracing::warn!(family, error = %e, "Cache invalidation task failed");
        }
    }

    async fn lookup<V: DeserializeOwned + Send>(&self, key: &str) -> Option<V> {
        let started = Instant::now();
        let result = self.cache.get_json::<V>(key).await;
        record_operation(T::FAMILY, "get", started);

        match result {
            Ok(Some(value)) => {
                metrics::counter!("cache_hits_total", "family" => T::FAMILY).increment(1);
                tracing::trace!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                metrics::counter!("cache_misses_total", "family" => T::FAMILY).increment(1);
                tracing::trace!(key, "Cache miss");
                None
            }
            Err(CacheError::Serialization(e)) => {
                metrics::counter!("cache_misses_total", "family" => T::FAMILY).increment(1);
                tracing::warn!(key, error = %e, "Undecodable cache entry, reading from store");
                None
            }
            Err(e) => {
                metrics::counter!("cache_misses_total", "family" => T::FAMILY).increment(1);
                tracing::warn!(key, error = %e, "Cache degraded, reading from store");
                None
            }
        }
    }

    fn populate<V: Serialize>(&self, key: String, value: &V, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode cache snapshot");
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        let family = T::FAMILY;
        drop(self.detached.spawn("cache-populate", async move {
            let started = Instant::now();
            let result = cache.set(&key, bytes, ttl).await;
            record_operation(family, "set", started);
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Cache population failed");
            }
        }));
    }
}

fn decode<T: DeserializeOwned>(doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| Error::StoreUnavailable(format!("corrupt document: {e}")))
}

fn store_failure(family: &'static str, op: &'static str, e: StoreError) -> Error {
    match &e {
        StoreError::Unavailable(_) | StoreError::Serialization(_) => {
            tracing::error!(family, op, error = %e, "Store operation failed");
        }
        StoreError::Conflict(_) | StoreError::InvalidDocument(_) => {
            tracing::debug!(family, op, error = %e, "Store rejected operation");
        }
    }
    e.into()
}

fn record_operation(family: &'static str, op: &'static str, started: Instant) {
    metrics::counter!("cache_operations_total", "family" => family, "op" => op).increment(1);
    metrics::histogram!("cache_operation_duration_seconds", "family" => family, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
