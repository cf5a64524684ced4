//! User accounts.
//!
//! E-mail addresses are unique; the store enforces it and a duplicate
//! surfaces as [`Error::Conflict`].

use crate::{ServiceEnvironment, require};
use book_exchange_core::cache::ttl;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::payloads::UserCreated;
use book_exchange_core::query::Query;
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{Error, ObjectId, Result};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Id.
    pub id: ObjectId,
    /// Display name.
    pub name: String,
    /// Unique contact address.
    pub email: String,
    /// Opaque credential, stored as given.
    #[serde(default)]
    pub password: String,
}

impl Entity for User {
    const FAMILY: &'static str = "user";
    const COLLECTION: CollectionSpec = CollectionSpec::with_unique("users", &["email"]);

    fn id(&self) -> ObjectId {
        self.id
    }
}

/// Fields of a new user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewUser {
    /// Display name (required).
    pub name: String,
    /// Contact address (required, unique).
    pub email: String,
    /// Opaque credential.
    pub password: String,
}

fn all_users() -> ListKey {
    ListKey::new("users", "all", ttl::VOLATILE_LIST)
}

/// Account use cases.
#[derive(Clone)]
pub struct AccountsService {
    users: CachedRepository<User>,
    emitter: EventEmitter,
}

impl AccountsService {
    /// Create the service.
    #[must_use]
    pub fn new(env: &ServiceEnvironment) -> Self {
        Self {
            users: env.repository(),
            emitter: env.emitter.clone(),
        }
    }

    /// Register a user and publish `user.created`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if name or e-mail is blank or the e-mail has no `@`
    /// - [`Error::Conflict`] if the e-mail is taken
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        require("name", &user.name)?;
        require("email", &user.email)?;
        if !user.email.contains('@') {
            return Err(Error::InvalidArgument(format!(
                "email {:?} is not an address",
                user.email
            )));
        }

        let created = self.users.insert(&user, |_| vec![all_users().key]).await?;
        tracing::info!(user_id = %created.id, "User created");

        self.emitter
            .emit(&UserCreated {
                id: created.id.to_hex(),
                name: created.name.clone(),
                email: created.email.clone(),
            })
            .await;
        Ok(created)
    }

    /// One user.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such user
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_user(&self, id: &ObjectId) -> Result<User> {
        self.users.get(id).await
    }

    /// Every user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.users.list(&all_users(), &Query::all()).await
    }
}
