//! Cache-aside behaviour of `CachedRepository` against the in-memory doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use book_exchange_core::cache::{self, Cache};
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{Error, ObjectId};
use book_exchange_testing::helpers::eventually;
use book_exchange_testing::{InMemoryCache, InMemoryDocumentStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    id: ObjectId,
    title: String,
    genre: String,
}

impl Entity for Book {
    const FAMILY: &'static str = "book";
    const COLLECTION: CollectionSpec = CollectionSpec::with_unique("books", &["title"]);

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Serialize)]
struct NewBook<'a> {
    title: &'a str,
    genre: &'a str,
}

struct Fixture {
    store: Arc<InMemoryDocumentStore>,
    cache: Arc<InMemoryCache>,
    books: CachedRepository<Book>,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryDocumentStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let books = CachedRepository::new(store.clone(), cache.clone());
    Fixture { store, cache, books }
}

fn genre_list(genre: &str) -> ListKey {
    ListKey::new("books", format!("genre:{genre}"), cache::ttl::FILTER_LIST)
}

fn genre_query(genre: &str) -> Query {
    Query::filter(Filter::eq("genre", genre))
}

const WAIT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn read_after_write_sees_the_write() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Dune", genre: "sci-fi" }, |_| Vec::new())
        .await
        .unwrap();

    // Warm the entity key.
    f.books.get(&book.id).await.unwrap();
    let key = CachedRepository::<Book>::entity_key(&book.id);
    assert!(eventually(WAIT, || f.cache.contains(&key)).await);

    let updated = f
        .books
        .modify(&book.id, &Update::new().set("title", "Dune Messiah"), |_| Vec::new())
        .await
        .unwrap();
    assert_eq!(updated.title, "Dune Messiah");

    let read = f.books.get(&book.id).await.unwrap();
    assert_eq!(read.title, "Dune Messiah");
}

#[tokio::test]
async fn miss_populates_and_next_read_hits() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Emma", genre: "classic" }, |_| Vec::new())
        .await
        .unwrap();
    let key = CachedRepository::<Book>::entity_key(&book.id);

    assert_eq!(f.books.get(&book.id).await.unwrap(), book);
    assert!(eventually(WAIT, || f.cache.contains(&key)).await);

    let before = f.cache.stats();
    assert_eq!(f.books.get(&book.id).await.unwrap(), book);
    assert_eq!(f.cache.stats().hits, before.hits + 1);
}

#[tokio::test]
async fn list_is_invalidated_by_member_insert() {
    let f = fixture();
    let list = genre_list("sci-fi");

    let empty = f.books.list(&list, &genre_query("sci-fi")).await.unwrap();
    assert!(empty.is_empty());
    assert!(eventually(WAIT, || f.cache.contains(&list.key)).await);

    let key = list.key.clone();
    f.books
        .insert(&NewBook { title: "Hyperion", genre: "sci-fi" }, move |_| vec![key])
        .await
        .unwrap();
    assert!(!f.cache.contains(&list.key));

    let listed = f.books.list(&list, &genre_query("sci-fi")).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn empty_list_is_a_cache_hit() {
    let f = fixture();
    let list = genre_list("poetry");
    f.cache
        .set(&list.key, b"[]".to_vec(), list.ttl)
        .await
        .unwrap();

    let listed = f.books.list(&list, &genre_query("poetry")).await.unwrap();
    assert!(listed.is_empty());
    assert_eq!(f.cache.stats().hits, 1);
}

#[tokio::test]
async fn null_and_garbage_entries_are_misses() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Ulysses", genre: "classic" }, |_| Vec::new())
        .await
        .unwrap();
    let key = CachedRepository::<Book>::entity_key(&book.id);

    f.cache.insert_raw(&key, b"null".to_vec(), Duration::from_secs(60));
    assert_eq!(f.books.get(&book.id).await.unwrap(), book);

    f.cache.insert_raw(&key, b"{not json".to_vec(), Duration::from_secs(60));
    assert_eq!(f.books.get(&book.id).await.unwrap(), book);
}

#[tokio::test]
async fn cache_outage_degrades_to_store() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Beloved", genre: "fiction" }, |_| Vec::new())
        .await
        .unwrap();
    f.cache.set_unavailable(true);

    assert_eq!(f.books.get(&book.id).await.unwrap(), book);
    let listed = f.books.list(&genre_list("fiction"), &genre_query("fiction")).await.unwrap();
    assert_eq!(listed, vec![book.clone()]);

    // Writes still commit while invalidation fails.
    let updated = f
        .books
        .modify(&book.id, &Update::new().set("genre", "classic"), |_| Vec::new())
        .await
        .unwrap();
    assert_eq!(updated.genre, "classic");
}

#[tokio::test]
async fn store_failure_leaves_cache_untouched() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Middlemarch", genre: "classic" }, |_| Vec::new())
        .await
        .unwrap();
    f.books.get(&book.id).await.unwrap();
    let key = CachedRepository::<Book>::entity_key(&book.id);
    assert!(eventually(WAIT, || f.cache.contains(&key)).await);
    let dels = f.cache.stats().dels;

    f.store.set_unavailable(true);
    let err = f
        .books
        .modify(&book.id, &Update::new().set("title", "x"), |_| Vec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert!(f.cache.contains(&key));
    assert_eq!(f.cache.stats().dels, dels);
}

#[tokio::test]
async fn unique_violation_is_conflict() {
    let f = fixture();
    f.books
        .insert(&NewBook { title: "Dune", genre: "sci-fi" }, |_| Vec::new())
        .await
        .unwrap();

    let err = f
        .books
        .insert(&NewBook { title: "Dune", genre: "other" }, |_| Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn missing_entity_is_not_found() {
    let f = fixture();
    let err = f.books.get(&ObjectId::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { entity: "book", .. }));

    let err = f.books.delete(&ObjectId::new(), |_| Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn guarded_modify_rejection_keeps_cache() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Persuasion", genre: "classic" }, |_| Vec::new())
        .await
        .unwrap();
    let dels = f.cache.stats().dels;

    let result = f
        .books
        .modify_where(
            &book.id,
            &Filter::eq("genre", "sci-fi"),
            &Update::new().set("title", "x"),
            |_| vec!["books:all".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(f.cache.stats().dels, dels);
}

#[tokio::test]
async fn delete_invalidates_entity_and_lists() {
    let f = fixture();
    let book = f
        .books
        .insert(&NewBook { title: "Walden", genre: "essay" }, |_| Vec::new())
        .await
        .unwrap();
    let list = genre_list("essay");
    f.books.list(&list, &genre_query("essay")).await.unwrap();
    f.books.get(&book.id).await.unwrap();
    let key = CachedRepository::<Book>::entity_key(&book.id);
    assert!(eventually(WAIT, || f.cache.contains(&key) && f.cache.contains(&list.key)).await);

    let list_key = list.key.clone();
    let removed = f.books.delete(&book.id, move |_| vec![list_key]).await.unwrap();

    assert_eq!(removed, book);
    assert!(!f.cache.contains(&key));
    assert!(!f.cache.contains(&list.key));
}
