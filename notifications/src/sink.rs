//! Where rendered e-mails go.

use crate::message::EmailMessage;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from handing a message to a sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Sender or recipient is not a valid mailbox.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The message could not be assembled.
    #[error("Failed to build email: {0}")]
    Build(String),

    /// The mail server did not accept the message.
    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// Future returned by [`EmailSink::send`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// Delivers plain-text e-mails.
pub trait EmailSink: Send + Sync {
    /// Deliver `message`.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the message was not accepted. The caller
    /// logs it and moves on; there is no retry.
    fn send<'a>(&'a self, message: &'a EmailMessage) -> SinkFuture<'a>;
}

/// Sink that writes messages to the log instead of sending them.
///
/// Selected when no SMTP host is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailSink;

impl LogEmailSink {
    /// Create a log sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailSink for LogEmailSink {
    fn send<'a>(&'a self, message: &'a EmailMessage) -> SinkFuture<'a> {
        Box::pin(async move {
            tracing::info!(
                to = %message.to,
                subject = %message.subject,
                body = %message.body,
                "Email (log sink)"
            );
            Ok(())
        })
    }
}
