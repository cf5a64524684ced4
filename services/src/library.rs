//! Per-user libraries: which user holds which book.
//!
//! An entry is a `(user_id, book_id)` pair. Duplicates are allowed; unassign
//! removes one matching entry.

use crate::ServiceEnvironment;
use crate::guarded::write_matching;
use crate::library_client::{LibraryClient, LibraryFuture};
use book_exchange_core::cache::ttl;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::payloads::{BookAssigned, BookUnassigned, EntryDeleted, EntryUpdated};
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{Error, ObjectId, Result};
use serde::{Deserialize, Serialize};

/// One book in one user's library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBook {
    /// Entry id.
    pub id: ObjectId,
    /// Holder.
    pub user_id: ObjectId,
    /// Held book.
    pub book_id: ObjectId,
}

impl Entity for UserBook {
    const FAMILY: &'static str = "user_book";
    const COLLECTION: CollectionSpec = CollectionSpec::new("user_books");

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Serialize)]
struct NewEntry<'a> {
    user_id: &'a ObjectId,
    book_id: &'a ObjectId,
}

/// A partial entry update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPatch {
    /// New holder.
    pub user_id: Option<ObjectId>,
    /// New book.
    pub book_id: Option<ObjectId>,
}

/// List keys.
pub mod keys {
    use super::{ListKey, ObjectId, ttl};

    /// Every entry.
    #[must_use]
    pub fn all() -> ListKey {
        ListKey::new("user_books", "all", ttl::VOLATILE_LIST)
    }

    /// Entries of one user.
    #[must_use]
    pub fn user(user: &ObjectId) -> ListKey {
        ListKey::new("user_books", user, ttl::FILTER_LIST)
    }

    /// Entries holding one book.
    #[must_use]
    pub fn book(book: &ObjectId) -> ListKey {
        ListKey::new("book_users", book, ttl::FILTER_LIST)
    }
}

fn affected_keys(entry: &UserBook) -> Vec<String> {
    vec![
        keys::all().key,
        keys::user(&entry.user_id).key,
        keys::book(&entry.book_id).key,
    ]
}

/// Store-side guard: the holder and the held book, which key the lists.
fn holding(entry: &UserBook) -> Filter {
    Filter::And(vec![
        Filter::eq("user_id", entry.user_id),
        Filter::eq("book_id", entry.book_id),
    ])
}

/// Library use cases.
#[derive(Clone)]
pub struct LibraryService {
    entries: CachedRepository<UserBook>,
    emitter: EventEmitter,
}

impl LibraryService {
    /// Create the service.
    #[must_use]
    pub fn new(env: &ServiceEnvironment) -> Self {
        Self {
            entries: env.repository(),
            emitter: env.emitter.clone(),
        }
    }

    /// Add `book` to `user`'s library and publish `userlibrary.book.assigned`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store write failed.
    pub async fn assign_book(&self, user: &ObjectId, book: &ObjectId) -> Result<UserBook> {
        let entry = self
            .entries
            .insert(
                &NewEntry {
                    user_id: user,
                    book_id: book,
                },
                affected_keys,
            )
            .await?;
        tracing::info!(entry_id = %entry.id, user_id = %user, book_id = %book, "Book assigned");

        self.emitter
            .emit(&BookAssigned {
                user_id: user.to_hex(),
                book_id: book.to_hex(),
            })
            .await;
        Ok(entry)
    }

    /// Remove one entry pairing `user` with `book` and publish
    /// `userlibrary.book.unassigned`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `user` does not hold `book`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn unassign_book(&self, user: &ObjectId, book: &ObjectId) -> Result<UserBook> {
        let query = Query::filter(Filter::And(vec![
            Filter::eq("user_id", user),
            Filter::eq("book_id", book),
        ]))
        .limit(1);
        let entry = self
            .entries
            .find_uncached(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(UserBook::FAMILY, format!("{user}/{book}")))?;

        let removed = self.entries.delete(&entry.id, affected_keys).await?;
        tracing::info!(entry_id = %removed.id, user_id = %user, book_id = %book, "Book unassigned");

        self.emitter
            .emit(&BookUnassigned {
                user_id: user.to_hex(),
                book_id: book.to_hex(),
            })
            .await;
        Ok(removed)
    }

    /// One entry.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such entry
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_entry(&self, id: &ObjectId) -> Result<UserBook> {
        self.entries.get(id).await
    }

    /// Delete an entry by id and publish `userlibrary.entry.deleted`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such entry
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn delete_entry(&self, id: &ObjectId) -> Result<UserBook> {
        let removed = self.entries.delete(id, affected_keys).await?;
        tracing::info!(entry_id = %id, "Library entry deleted");

        self.emitter
            .emit(&EntryDeleted {
                id: removed.id.to_hex(),
                user_id: removed.user_id.to_hex(),
            })
            .await;
        Ok(removed)
    }

    /// Rewrite an entry and publish `userlibrary.entry.updated` with the
    /// post-image.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the patch is empty
    /// - [`Error::NotFound`] if there is no such entry
    /// - [`Error::Conflict`] if concurrent writers kept moving the entry
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn update_entry(&self, id: &ObjectId, patch: EntryPatch) -> Result<UserBook> {
        let mut update = Update::new();
        if let Some(user) = patch.user_id {
            update = update.set("user_id", user);
        }
        if let Some(book) = patch.book_id {
            update = update.set("book_id", book);
        }
        if update.is_empty() {
            return Err(Error::InvalidArgument("no fields to update".to_string()));
        }

        let updated = write_matching(&self.entries, id, holding, &update, affected_keys).await?;
        tracing::info!(entry_id = %id, user_id = %updated.user_id, book_id = %updated.book_id, "Library entry updated");

        self.emitter
            .emit(&EntryUpdated {
                id: updated.id.to_hex(),
                user_id: updated.user_id.to_hex(),
                book_id: updated.book_id.to_hex(),
            })
            .await;
        Ok(updated)
    }

    /// Entries of one user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_user_books(&self, user: &ObjectId) -> Result<Vec<UserBook>> {
        self.entries
            .list(&keys::user(user), &Query::filter(Filter::eq("user_id", user)))
            .await
    }

    /// Entries holding one book.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_book_users(&self, book: &ObjectId) -> Result<Vec<UserBook>> {
        self.entries
            .list(&keys::book(book), &Query::filter(Filter::eq("book_id", book)))
            .await
    }

    /// Every entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_entries(&self) -> Result<Vec<UserBook>> {
        self.entries.list(&keys::all(), &Query::all()).await
    }
}

impl LibraryClient for LibraryService {
    fn assign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        Box::pin(async move { self.assign_book(user, book).await.map(drop) })
    }

    fn unassign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        Box::pin(async move { self.unassign_book(user, book).await.map(drop) })
    }
}
