//! Test doubles for the orchestrator's collaborators.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use crate::directory::{DirectoryFuture, UserDirectory};
use crate::message::EmailMessage;
use crate::sink::{EmailSink, SinkError, SinkFuture};
use book_exchange_core::{Error, ObjectId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Directory backed by a map.
///
/// Unknown users are `NotFound`; [`set_unavailable`](Self::set_unavailable)
/// makes every lookup fail with `DownstreamUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    emails: Arc<Mutex<HashMap<ObjectId, String>>>,
    lookups: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryUserDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` with `email`.
    pub fn insert(&self, user: ObjectId, email: impl Into<String>) {
        self.emails.lock().unwrap().insert(user, email.into());
    }

    /// Make every lookup fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn email_of<'a>(&'a self, user: &'a ObjectId) -> DirectoryFuture<'a> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::DownstreamUnavailable("accounts unreachable".to_string()));
            }
            self.emails
                .lock()
                .unwrap()
                .get(user)
                .cloned()
                .ok_or_else(|| Error::not_found("user", user))
        })
    }
}

/// Sink that keeps every message it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSink {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingEmailSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages accepted for `to`.
    #[must_use]
    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    /// Make every send fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EmailSink for RecordingEmailSink {
    fn send<'a>(&'a self, message: &'a EmailMessage) -> SinkFuture<'a> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Transport("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        })
    }
}
