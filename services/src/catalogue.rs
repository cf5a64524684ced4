//! Book catalogue.
//!
//! Cache keys:
//!
//! | Key | Content | TTL |
//! |---|---|---|
//! | `book:<id>` | one book | 15 min |
//! | `books:all` | every book | 5 min |
//! | `books:genre:<g>`, `books:author:<a>`, `books:language:<l>` | filtered | 10 min |
//! | `books:top_rated` | 10 best rated | 15 min |
//! | `books:new_arrivals` | 10 newest | 30 min |
//! | `books:recommended` | recommendations, shared by every user | 30 min |

use crate::guarded::write_matching;
use crate::{ServiceEnvironment, require};
use book_exchange_core::cache::ttl;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::environment::{Clock, rfc3339_micros, truncate_micros};
use book_exchange_core::payloads::BookCreated;
use book_exchange_core::query::{Direction, Filter, Query, Update};
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{DateTime, Error, ObjectId, Result, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LISTS: &str = "books";
const RANKED_LIMIT: usize = 10;

/// A book in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Id.
    pub id: ObjectId,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Genre.
    #[serde(default)]
    pub genre: String,
    /// Language.
    #[serde(default)]
    pub language: String,
    /// Blurb.
    #[serde(default)]
    pub description: String,
    /// Average rating.
    #[serde(default)]
    pub rating: f64,
    /// Price.
    #[serde(default)]
    pub price: f64,
    /// Page count.
    #[serde(default)]
    pub pages: u32,
    /// Publication date, free-form.
    #[serde(default)]
    pub published_date: String,
    /// When the book was added.
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
}

impl Entity for Book {
    const FAMILY: &'static str = "book";
    const COLLECTION: CollectionSpec = CollectionSpec::new("books");

    fn id(&self) -> ObjectId {
        self.id
    }
}

/// Fields of a new book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBook {
    /// Title (required).
    pub title: String,
    /// Author (required).
    pub author: String,
    /// Genre.
    pub genre: String,
    /// Language.
    pub language: String,
    /// Blurb.
    pub description: String,
    /// Average rating.
    pub rating: f64,
    /// Price.
    pub price: f64,
    /// Page count.
    pub pages: u32,
    /// Publication date, free-form.
    pub published_date: String,
}

/// A partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookPatch {
    /// New title.
    pub title: Option<String>,
    /// New author.
    pub author: Option<String>,
    /// New genre.
    pub genre: Option<String>,
    /// New language.
    pub language: Option<String>,
    /// New blurb.
    pub description: Option<String>,
    /// New rating.
    pub rating: Option<f64>,
    /// New price.
    pub price: Option<f64>,
    /// New page count.
    pub pages: Option<u32>,
    /// New publication date.
    pub published_date: Option<String>,
}

impl BookPatch {
    fn to_update(&self) -> Result<Update> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(author) = &self.author {
            require("author", author)?;
        }

        let mut update = Update::new();
        if let Some(v) = &self.title {
            update = update.set("title", v);
        }
        if let Some(v) = &self.author {
            update = update.set("author", v);
        }
        if let Some(v) = &self.genre {
            update = update.set("genre", v);
        }
        if let Some(v) = &self.language {
            update = update.set("language", v);
        }
        if let Some(v) = &self.description {
            update = update.set("description", v);
        }
        if let Some(v) = self.rating {
            update = update.set("rating", v);
        }
        if let Some(v) = self.price {
            update = update.set("price", v);
        }
        if let Some(v) = self.pages {
            update = update.set("pages", v);
        }
        if let Some(v) = &self.published_date {
            update = update.set("published_date", v);
        }

        if update.is_empty() {
            return Err(Error::InvalidArgument("no fields to update".to_string()));
        }
        Ok(update)
    }
}

#[derive(Serialize)]
struct StoredBook<'a> {
    #[serde(flatten)]
    book: &'a NewBook,
    #[serde(with = "rfc3339_micros")]
    created_at: DateTime<Utc>,
}

/// List keys.
pub mod keys {
    use super::{LISTS, ListKey, ttl};

    /// Every book.
    #[must_use]
    pub fn all() -> ListKey {
        ListKey::new(LISTS, "all", ttl::VOLATILE_LIST)
    }

    /// Books of one genre.
    #[must_use]
    pub fn genre(genre: &str) -> ListKey {
        ListKey::new(LISTS, format!("genre:{genre}"), ttl::FILTER_LIST)
    }

    /// Books by one author.
    #[must_use]
    pub fn author(author: &str) -> ListKey {
        ListKey::new(LISTS, format!("author:{author}"), ttl::FILTER_LIST)
    }

    /// Books in one language.
    #[must_use]
    pub fn language(language: &str) -> ListKey {
        ListKey::new(LISTS, format!("language:{language}"), ttl::FILTER_LIST)
    }

    /// Best rated.
    #[must_use]
    pub fn top_rated() -> ListKey {
        ListKey::new(LISTS, "top_rated", ttl::TOP_RATED)
    }

    /// Most recently added.
    #[must_use]
    pub fn new_arrivals() -> ListKey {
        ListKey::new(LISTS, "new_arrivals", ttl::SLOW_LIST)
    }

    /// Recommendations. The selection does not depend on the user, so one
    /// snapshot serves everyone and every book write can reach it.
    #[must_use]
    pub fn recommended() -> ListKey {
        ListKey::new(LISTS, "recommended", ttl::SLOW_LIST)
    }
}

/// Every list key a book's membership or rank can affect.
fn affected_keys(book: &Book) -> Vec<String> {
    vec![
        keys::all().key,
        keys::genre(&book.genre).key,
        keys::author(&book.author).key,
        keys::language(&book.language).key,
        keys::top_rated().key,
        keys::new_arrivals().key,
        keys::recommended().key,
    ]
}

/// Store-side guard: the fields `affected_keys` derives list keys from.
fn list_fields(book: &Book) -> Filter {
    Filter::And(vec![
        Filter::eq("genre", &book.genre),
        Filter::eq("author", &book.author),
        Filter::eq("language", &book.language),
    ])
}

fn top_rated_query() -> Query {
    Query::all()
        .sorted_by("rating", Direction::Descending)
        .limit(RANKED_LIMIT)
}

/// Catalogue use cases.
#[derive(Clone)]
pub struct CatalogueService {
    books: CachedRepository<Book>,
    emitter: EventEmitter,
    clock: Arc<dyn Clock>,
}

impl CatalogueService {
    /// Create the service.
    #[must_use]
    pub fn new(env: &ServiceEnvironment) -> Self {
        Self {
            books: env.repository(),
            emitter: env.emitter.clone(),
            clock: Arc::clone(&env.clock),
        }
    }

    /// Add a book and publish `book.created`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if title or author is blank
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn create_book(&self, book: NewBook) -> Result<Book> {
        require("title", &book.title)?;
        require("author", &book.author)?;

        let stored = StoredBook {
            book: &book,
            created_at: truncate_micros(self.clock.now()),
        };
        let created = self.books.insert(&stored, affected_keys).await?;

        tracing::info!(book_id = %created.id, title = %created.title, "Book created");
        self.emitter
            .emit(&BookCreated {
                id: created.id.to_hex(),
                title: created.title.clone(),
                author: created.author.clone(),
            })
            .await;
        Ok(created)
    }

    /// One book.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such book
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_book(&self, id: &ObjectId) -> Result<Book> {
        self.books.get(id).await
    }

    /// Change some fields of a book.
    ///
    /// Lists the book left (old genre, author, language) and joined are both
    /// invalidated. The write only lands if those fields still hold the values
    /// the left lists were derived from; otherwise it is retried.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the patch is empty or blanks a required field
    /// - [`Error::NotFound`] if there is no such book
    /// - [`Error::Conflict`] if concurrent writers kept moving the book
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn update_book(&self, id: &ObjectId, patch: &BookPatch) -> Result<Book> {
        let update = patch.to_update()?;
        let updated = write_matching(&self.books, id, list_fields, &update, affected_keys).await?;
        tracing::info!(book_id = %id, "Book updated");
        Ok(updated)
    }

    /// Remove a book.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such book
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn delete_book(&self, id: &ObjectId) -> Result<Book> {
        let deleted = self.books.delete(id, affected_keys).await?;
        tracing::info!(book_id = %id, "Book deleted");
        Ok(deleted)
    }

    /// Every book, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.books.list(&keys::all(), &Query::all()).await
    }

    /// Books of one genre.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        self.books
            .list(&keys::genre(genre), &Query::filter(Filter::eq("genre", genre)))
            .await
    }

    /// Books by one author.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_author(&self, author: &str) -> Result<Vec<Book>> {
        self.books
            .list(&keys::author(author), &Query::filter(Filter::eq("author", author)))
            .await
    }

    /// Books in one language.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_language(&self, language: &str) -> Result<Vec<Book>> {
        self.books
            .list(
                &keys::language(language),
                &Query::filter(Filter::eq("language", language)),
            )
            .await
    }

    /// The ten best rated books.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn top_rated(&self) -> Result<Vec<Book>> {
        self.books.list(&keys::top_rated(), &top_rated_query()).await
    }

    /// The ten most recently added books.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn new_arrivals(&self) -> Result<Vec<Book>> {
        let query = Query::all()
            .sorted_by("created_at", Direction::Descending)
            .limit(RANKED_LIMIT);
        self.books.list(&keys::new_arrivals(), &query).await
    }

    /// Case-insensitive substring search over title and author. Never cached.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `keyword` is blank
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn search(&self, keyword: &str) -> Result<Vec<Book>> {
        require("keyword", keyword)?;
        let keyword = keyword.trim();
        let filter = Filter::Or(vec![
            Filter::like("title", keyword),
            Filter::like("author", keyword),
        ]);
        self.books.find_uncached(&Query::filter(filter)).await
    }

    /// Recommendations for `user`: currently the best rated books.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn recommend(&self, user: &ObjectId) -> Result<Vec<Book>> {
        tracing::debug!(user_id = %user, "Recommending books");
        self.books.list(&keys::recommended(), &top_rated_query()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_rejected() {
        assert!(matches!(
            BookPatch::default().to_update(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn patch_cannot_blank_the_title() {
        let patch = BookPatch {
            title: Some("  ".to_string()),
            ..BookPatch::default()
        };
        assert!(matches!(patch.to_update(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn patch_sets_only_given_fields() {
        let patch = BookPatch {
            genre: Some("classic".to_string()),
            pages: Some(320),
            ..BookPatch::default()
        };
        let update = patch.to_update().unwrap_or_default();
        let fields: Vec<&str> = update.ops().iter().map(|op| op.field()).collect();
        assert_eq!(fields, vec!["genre", "pages"]);
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(keys::genre("sci-fi").key, "books:genre:sci-fi");
        assert_eq!(keys::top_rated().key, "books:top_rated");
        assert_eq!(
            CachedRepository::<Book>::entity_key(&ObjectId::from_bytes([0xab; 12])),
            "book:abababababababababababab"
        );
    }
}
