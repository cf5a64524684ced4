//! Test doubles for the services' downstream dependencies.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use crate::library_client::{LibraryClient, LibraryFuture};
use book_exchange_core::{Error, ObjectId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A library call as seen by [`RecordingLibraryClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryCall {
    /// `assign(user, book)`.
    Assign(ObjectId, ObjectId),
    /// `unassign(user, book)`.
    Unassign(ObjectId, ObjectId),
}

#[derive(Debug, Default)]
struct Holdings {
    held: HashMap<(ObjectId, ObjectId), usize>,
    calls: Vec<LibraryCall>,
    fail_assign_of: Option<ObjectId>,
    unavailable: bool,
}

/// In-memory library that records every call.
///
/// Tracks who holds what so unassigning a book the user does not hold fails
/// with `NotFound`, like the real service. Can be told to fail assigning a
/// particular book, or to be unreachable altogether.
#[derive(Debug, Clone, Default)]
pub struct RecordingLibraryClient {
    state: Arc<Mutex<Holdings>>,
}

impl RecordingLibraryClient {
    /// An empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `user` a copy of `book` without recording a call.
    pub fn hold(&self, user: ObjectId, book: ObjectId) {
        *self.state.lock().unwrap().held.entry((user, book)).or_default() += 1;
    }

    /// Whether `user` holds at least one copy of `book`.
    #[must_use]
    pub fn holds(&self, user: ObjectId, book: ObjectId) -> bool {
        self.state
            .lock()
            .unwrap()
            .held
            .get(&(user, book))
            .is_some_and(|n| *n > 0)
    }

    /// Calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<LibraryCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Make assigning `book` fail with `DownstreamUnavailable`.
    pub fn fail_assign_of(&self, book: ObjectId) {
        self.state.lock().unwrap().fail_assign_of = Some(book);
    }

    /// Make every call fail with `DownstreamUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    fn apply(&self, call: LibraryCall) -> book_exchange_core::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.unavailable {
            return Err(Error::DownstreamUnavailable("library unreachable".to_string()));
        }

        match call {
            LibraryCall::Assign(user, book) => {
                if state.fail_assign_of == Some(book) {
                    return Err(Error::DownstreamUnavailable(format!("assign of {book} failed")));
                }
                *state.held.entry((user, book)).or_default() += 1;
                Ok(())
            }
            LibraryCall::Unassign(user, book) => match state.held.get_mut(&(user, book)) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Ok(())
                }
                _ => Err(Error::not_found("user_book", format!("{user}/{book}"))),
            },
        }
    }
}

impl LibraryClient for RecordingLibraryClient {
    fn assign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        let result = self.apply(LibraryCall::Assign(*user, *book));
        Box::pin(async move { result })
    }

    fn unassign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        let result = self.apply(LibraryCall::Unassign(*user, *book));
        Box::pin(async move { result })
    }
}
