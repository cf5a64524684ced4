//! Shared fixture: services over the in-memory doubles.

#![allow(dead_code, clippy::expect_used)]

use book_exchange_core::environment::Clock;
use book_exchange_core::event::DomainEvent;
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::store::{CollectionSpec, DocumentStore, StoreFuture};
use book_exchange_core::ObjectId;
use book_exchange_testing::{InMemoryCache, InMemoryDocumentStore, InMemoryEventBus};
use book_exchange_services::ServiceEnvironment;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(1);

pub struct Harness {
    pub env: ServiceEnvironment,
    pub store: Arc<InMemoryDocumentStore>,
    pub cache: Arc<InMemoryCache>,
    pub bus: Arc<InMemoryEventBus>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let env = ServiceEnvironment::new(store.clone(), cache.clone(), bus.clone());
        Self { env, store, cache, bus }
    }

    /// Services whose first conditional write loses a race: `concurrent` is
    /// committed to the same document just before it lands.
    pub fn with_concurrent_write(concurrent: Update) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let racing = RacingStore {
            inner: store.clone(),
            pending: Mutex::new(Some(concurrent)),
        };
        let env = ServiceEnvironment::new(Arc::new(racing), cache.clone(), bus.clone());
        Self { env, store, cache, bus }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut harness = Self::new();
        harness.env = harness.env.with_clock(clock);
        harness
    }

    /// Payloads published on `E::SUBJECT`, decoded.
    pub fn events<E: DomainEvent>(&self) -> Vec<E> {
        self.bus
            .published_on(E::SUBJECT)
            .iter()
            .map(|envelope| envelope.decode::<E>().expect("published payload decodes"))
            .collect()
    }
}

/// Delegates to the in-memory store, committing one pending update of its own
/// ahead of the first `find_and_modify`.
struct RacingStore {
    inner: Arc<InMemoryDocumentStore>,
    pending: Mutex<Option<Update>>,
}

impl DocumentStore for RacingStore {
    fn find_by_id<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        self.inner.find_by_id(collection, id)
    }

    fn find<'a>(&'a self, collection: &'a CollectionSpec, query: &'a Query) -> StoreFuture<'a, Vec<Value>> {
        self.inner.find(collection, query)
    }

    fn insert<'a>(&'a self, collection: &'a CollectionSpec, doc: Value) -> StoreFuture<'a, Value> {
        self.inner.insert(collection, doc)
    }

    fn find_and_modify<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
        guard: &'a Filter,
        update: &'a Update,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let concurrent = self.pending.lock().expect("pending lock").take();
            if let Some(concurrent) = concurrent {
                self.inner
                    .find_and_modify(collection, id, &Filter::All, &concurrent)
                    .await?;
            }
            self.inner.find_and_modify(collection, id, guard, update).await
        })
    }

    fn delete<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        self.inner.delete(collection, id)
    }
}
