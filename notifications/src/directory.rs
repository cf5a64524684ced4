//! Resolving user ids to e-mail addresses.

use book_exchange_core::{ObjectId, Result};
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`UserDirectory::email_of`].
pub type DirectoryFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Looks up a user's contact address, typically via the accounts service.
pub trait UserDirectory: Send + Sync {
    /// The e-mail address of `user`.
    ///
    /// # Errors
    ///
    /// - [`book_exchange_core::Error::NotFound`] if there is no such user
    /// - [`book_exchange_core::Error::DownstreamUnavailable`] if the directory
    ///   could not be reached
    fn email_of<'a>(&'a self, user: &'a ObjectId) -> DirectoryFuture<'a>;
}
