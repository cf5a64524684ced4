//! In-memory document store.
//!
//! Evaluates queries and updates with the pure evaluators in
//! [`book_exchange_core::query`], so it defines the reference behaviour the
//! Postgres adapter is tested against.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use book_exchange_core::ObjectId;
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::store::{
    CollectionSpec, DocumentStore, StoreError, StoreFuture, validate_query, validate_update,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Collections of JSON documents kept in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<&'static str, Vec<Value>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while set, every operation fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &CollectionSpec) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection.name)
            .map_or(0, Vec::len)
    }

    /// Whether a collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &CollectionSpec) -> bool {
        self.len(collection) == 0
    }

    /// Snapshot of a collection's documents in insertion order.
    #[must_use]
    pub fn documents(&self, collection: &CollectionSpec) -> Vec<Value> {
        self.collections
            .read()
            .unwrap()
            .get(collection.name)
            .cloned()
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn id_of(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// First unique field of `candidate` already held by another document.
fn unique_violation(
    collection: &CollectionSpec,
    docs: &[Value],
    candidate: &Value,
) -> Option<String> {
    let own_id = id_of(candidate);
    collection.unique.iter().find_map(|field| {
        let value = candidate.get(*field).filter(|v| !v.is_null())?;
        docs.iter()
            .filter(|doc| id_of(doc) != own_id)
            .any(|doc| doc.get(*field) == Some(value))
            .then(|| format!("{}.{field} already exists", collection.name))
    })
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_by_id<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            self.check_available()?;
            let hex = id.to_hex();
            Ok(self
                .collections
                .read()
                .unwrap()
                .get(collection.name)
                .and_then(|docs| docs.iter().find(|doc| id_of(doc) == Some(hex.as_str())))
                .cloned())
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        query: &'a Query,
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(async move {
            self.check_available()?;
            validate_query(query)?;
            Ok(query.apply(self.documents(collection)))
        })
    }

    fn insert<'a>(&'a self, collection: &'a CollectionSpec, doc: Value) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.check_available()?;
            let mut doc = doc;
            let Some(object) = doc.as_object_mut() else {
                return Err(StoreError::InvalidDocument("document must be an object".to_string()));
            };
            object.insert("id".to_string(), Value::String(ObjectId::new().to_hex()));

            let mut collections = self.collections.write().unwrap();
            let docs = collections.entry(collection.name).or_default();
            if let Some(violation) = unique_violation(collection, docs, &doc) {
                return Err(StoreError::Conflict(violation));
            }
            docs.push(doc.clone());
            Ok(doc)
        })
    }

    fn find_and_modify<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
        guard: &'a Filter,
        update: &'a Update,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            self.check_available()?;
            validate_update(update)?;
            let hex = id.to_hex();

            let mut collections = self.collections.write().unwrap();
            let Some(docs) = collections.get_mut(collection.name) else {
                return Ok(None);
            };
            let Some(index) = docs.iter().position(|doc| id_of(doc) == Some(hex.as_str())) else {
                return Ok(None);
            };
            if !guard.matches(&docs[index]) {
                return Ok(None);
            }

            let mut next = docs[index].clone();
            update.apply(&mut next);
            if let Some(violation) = unique_violation(collection, docs, &next) {
                return Err(StoreError::Conflict(violation));
            }
            docs[index] = next.clone();
            Ok(Some(next))
        })
    }

    fn delete<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            self.check_available()?;
            let hex = id.to_hex();
            let mut collections = self.collections.write().unwrap();
            let Some(docs) = collections.get_mut(collection.name) else {
                return Ok(None);
            };
            Ok(docs
                .iter()
                .position(|doc| id_of(doc) == Some(hex.as_str()))
                .map(|index| docs.remove(index)))
        })
    }
}
