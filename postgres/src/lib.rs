//! `PostgreSQL` document store for Book Exchange services.
//!
//! Implements the `DocumentStore` trait from `book-exchange-core` on top of
//! sqlx. Every collection is one table:
//!
//! ```sql
//! CREATE TABLE <collection> (
//!     id  TEXT PRIMARY KEY,          -- 24-char hex ObjectId
//!     seq BIGSERIAL NOT NULL,        -- insertion order
//!     doc JSONB NOT NULL             -- the document, including "id"
//! );
//! CREATE UNIQUE INDEX <collection>_<field>_key ON <collection> ((doc->>'<field>'));
//! ```
//!
//! Filters and sorts are translated to JSONB operators. Guarded updates run
//! in a transaction that locks the row (`SELECT ... FOR UPDATE`), applies the
//! update with the same evaluator the in-memory store uses, and writes the
//! post-image back.
//!
//! # Example
//!
//! ```ignore
//! use book_exchange_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::new("postgres://localhost/books").await?;
//!     store.migrate(&[Book::COLLECTION]).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sql;

use book_exchange_core::ObjectId;
use book_exchange_core::query::{Filter, Query, Update, is_valid_name};
use book_exchange_core::store::{
    CollectionSpec, DocumentStore, StoreError, StoreFuture, validate_query, validate_update,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Instant;

/// `PostgreSQL`-backed [`DocumentStore`].
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect with a pool of up to 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;
        tracing::info!("Connected to PostgreSQL document store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and unique indexes for `collections` if missing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidDocument`] for unusable collection or field names
    /// - [`StoreError::Unavailable`] if DDL fails
    pub async fn migrate(&self, collections: &[CollectionSpec]) -> Result<(), StoreError> {
        for collection in collections {
            check_collection(collection)?;
            let name = collection.name;

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id TEXT PRIMARY KEY,
                    seq BIGSERIAL NOT NULL,
                    doc JSONB NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to create {name}: {e}")))?;

            for field in collection.unique {
                if !is_valid_name(field) {
                    return Err(StoreError::InvalidDocument(format!(
                        "invalid unique field {field:?} on {name}"
                    )));
                }
                sqlx::query(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {name}_{field}_key ON {name} ((doc->>'{field}'))"
                ))
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::Unavailable(format!("Failed to index {name}.{field}: {e}"))
                })?;
            }
            tracing::debug!(collection = name, unique = ?collection.unique, "Collection migrated");
        }
        Ok(())
    }
}

fn check_collection(collection: &CollectionSpec) -> Result<(), StoreError> {
    if is_valid_name(collection.name) {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(format!(
            "invalid collection name {:?}",
            collection.name
        )))
    }
}

/// Map a sqlx error, turning unique-index violations into conflicts.
fn map_sqlx(collection: &CollectionSpec, op: &str, e: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(format!(
                "{} already holds a document with this {}",
                collection.name,
                collection.unique.join("/")
            ));
        }
    }
    StoreError::Unavailable(format!("{op} on {}: {e}", collection.name))
}

fn record(collection: &CollectionSpec, op: &'static str, started: Instant) {
    metrics::histogram!(
        "store_operation_duration_seconds",
        "collection" => collection.name,
        "op" => op
    )
    .record(started.elapsed().as_secs_f64());
}

impl DocumentStore for PostgresDocumentStore {
    fn find_by_id<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            check_collection(collection)?;
            let started = Instant::now();
            let row: Option<Json<Value>> = sqlx::query_scalar(&format!(
                "SELECT doc FROM {} WHERE id = $1",
                collection.name
            ))
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(collection, "find_by_id", &e))?;
            record(collection, "find_by_id", started);
            Ok(row.map(|Json(doc)| doc))
        })
    }

    fn find<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        query: &'a Query,
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(async move {
            check_collection(collection)?;
            validate_query(query)?;
            let started = Instant::now();

            let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT doc FROM {}", collection.name));
            sql::push_query(&mut qb, query);
            let rows: Vec<Json<Value>> = qb
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx(collection, "find", &e))?;

            record(collection, "find", started);
            Ok(rows.into_iter().map(|Json(doc)| doc).collect())
        })
    }

    fn insert<'a>(&'a self, collection: &'a CollectionSpec, doc: Value) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            check_collection(collection)?;
            let mut doc = doc;
            let id = ObjectId::new().to_hex();
            let Some(object) = doc.as_object_mut() else {
                return Err(StoreError::InvalidDocument("document must be an object".to_string()));
            };
            object.insert("id".to_string(), Value::String(id.clone()));

            let started = Instant::now();
            let Json(stored): Json<Value> = sqlx::query_scalar(&format!(
                "INSERT INTO {} (id, doc) VALUES ($1, $2) RETURNING doc",
                collection.name
            ))
            .bind(&id)
            .bind(Json(&doc))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx(collection, "insert", &e))?;

            record(collection, "insert", started);
            tracing::debug!(collection = collection.name, id = %id, "Document inserted");
            Ok(stored)
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
            check_collection(collection)?;
            validate_update(update)?;
            validate_query(&Query::filter(guard.clone()))?;
            let started = Instant::now();
            let hex = id.to_hex();

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx(collection, "begin", &e))?;

            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "SELECT doc FROM {} WHERE id = ",
                collection.name
            ));
            qb.push_bind(hex.clone());
            qb.push(" AND ");
            sql::push_filter(&mut qb, guard);
            qb.push(" FOR UPDATE");
            let current: Option<Json<Value>> = qb
                .build_query_scalar()
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx(collection, "find_and_modify", &e))?;

            let Some(Json(mut doc)) = current else {
                return Ok(None);
            };
            update.apply(&mut doc);

            sqlx::query(&format!("UPDATE {} SET doc = $2 WHERE id = $1", collection.name))
                .bind(&hex)
                .bind(Json(&doc))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx(collection, "find_and_modify", &e))?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx(collection, "commit", &e))?;

            record(collection, "find_and_modify", started);
            Ok(Some(doc))
        })
    }

    fn delete<'a>(
        &'a self,
        collection: &'a CollectionSpec,
        id: &'a ObjectId,
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            check_collection(collection)?;
            let started = Instant::now();
            let removed: Option<Json<Value>> = sqlx::query_scalar(&format!(
                "DELETE FROM {} WHERE id = $1 RETURNING doc",
                collection.name
            ))
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx(collection, "delete", &e))?;
            record(collection, "delete", started);
            Ok(removed.map(|Json(doc)| doc))
        })
    }
}
