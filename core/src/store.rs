//! Document store abstraction.
//!
//! Each service keeps its entities as JSON documents in collections of its
//! own store. The store is the source of truth; the cache in front of it is
//! kept consistent by [`crate::repository::CachedRepository`].
//!
//! # Contract
//!
//! - `insert` assigns a fresh id (the `id` field) and returns the stored record
//! - `find_and_modify` returns the record *after* the update
//! - `delete` is idempotent and returns the removed record, if any
//! - unique fields declared in [`CollectionSpec`] are enforced by the store and
//!   violations surface as [`StoreError::Conflict`]
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `book-exchange-postgres`): JSONB rows
//! - `InMemoryDocumentStore` (in `book-exchange-testing`): for tests

use crate::id::ObjectId;
use crate::query::{Filter, Query, Update};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique field already holds this value.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// The document or update is not acceptable (bad field name, not an object, ...).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Connection or query failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Static description of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Collection name. Must satisfy [`crate::query::is_valid_name`].
    pub name: &'static str,
    /// Top-level string fields whose values are unique across the collection.
    pub unique: &'static [&'static str],
}

impl CollectionSpec {
    /// A collection without unique fields.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, unique: &[] }
    }

    /// A collection with unique fields.
    #[must_use]
    pub const fn with_unique(name: &'static str, unique: &'static [&'static str]) -> Self {
        Self { name, unique }
    }
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Document store abstraction.
///
/// Documents are JSON objects; the `id` field holds the hex id.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so services hold an
/// `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure.
    fn find_by_id<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>>;

    /// Fetch every document matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure and
    /// [`StoreError::InvalidDocument`] for unusable field names.
    fn find<'a>(&'a self, collection: &'a CollectionSpec, query: &'a Query)
    -> StoreFuture<'a, Vec<Value>>;

    /// Insert a document, assigning it a fresh id.
    ///
    /// Any `id` already present in `doc` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on unique-field violation.
    fn insert<'a>(&'a self, collection: &'a CollectionSpec, doc: Value) -> StoreFuture<'a, Value>;

    /// Atomically apply `update` to the document with `id` if it also matches
    /// `guard`, returning the post-image.
    ///
    /// Returns `None` when no document has that id or the guard rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on unique-field violation and
    /// [`StoreError::InvalidDocument`] if the update writes `id`.
    fn find_and_modify<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
        guard: &'a Filter,
        update: &'a Update,
    ) -> StoreFuture<'a, Option<Value>>;

    /// Delete by id, returning the removed document.
    ///
    /// Deleting a missing id returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure.
    fn delete<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>>;
}

/// Check that an update can be applied by any store.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDocument`] if the update is empty, writes
/// `id`, or names an unusable field.
pub fn validate_update(update: &Update) -> Result<(), StoreError> {
    if update.is_empty() {
        return Err(StoreError::InvalidDocument("empty update".to_string()));
    }
    for op in update.ops() {
        let field = op.field();
        if field == "id" {
            return Err(StoreError::InvalidDocument("id is immutable".to_string()));
        }
        if !crate::query::is_valid_name(field) {
            return Err(StoreError::InvalidDocument(format!("invalid field name {field:?}")));
        }
    }
    Ok(())
}

/// Check every field a query refers to.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDocument`] naming the first unusable field.
pub fn validate_query(query: &Query) -> Result<(), StoreError> {
    let sort_field = query.sort.as_ref().map(|s| s.field.as_str());
    for field in query.filter.fields().into_iter().chain(sort_field) {
        if !crate::query::is_valid_name(field) {
            return Err(StoreError::InvalidDocument(format!("invalid field name {field:?}")));
        }
    }
    Ok(())
}
