//! The library operations exchange settlement depends on.
//!
//! Implemented in process by [`crate::LibraryService`], over HTTP by
//! `HttpLibraryClient` in `book-exchange-web`, and by
//! [`crate::mocks::RecordingLibraryClient`] in tests.

use book_exchange_core::{ObjectId, Result};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`LibraryClient`] calls.
pub type LibraryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Moves books in and out of users' libraries.
pub trait LibraryClient: Send + Sync {
    /// Give `book` to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`book_exchange_core::Error::DownstreamUnavailable`] if the
    /// library could not be reached.
    fn assign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a>;

    /// Take `book` away from `user`.
    ///
    /// # Errors
    ///
    /// - [`book_exchange_core::Error::NotFound`] if `user` does not hold `book`
    /// - [`book_exchange_core::Error::DownstreamUnavailable`] if the library could not be reached
    fn unassign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a>;
}
