//! The notification orchestrator.
//!
//! Every event walks the same path and ends in exactly one of two states:
//!
//! ```text
//! received → drafted → recipient resolved → delivered
//!     │          │              │
//!     └──────────┴──────────────┴──────────→ dropped(reason)
//! ```
//!
//! Nothing is retried and nothing is kept between events, so the same
//! orchestrator can serve any number of events concurrently.

use crate::directory::UserDirectory;
use crate::message::{self, DropReason, Recipient};
use crate::sink::EmailSink;
use async_trait::async_trait;
use book_exchange_core::event::SerializedEvent;
use book_exchange_runtime::{EventHandler, HandlerError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How one event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sink accepted a message for `to`.
    Delivered {
        /// Recipient address.
        to: String,
    },
    /// The event produced no e-mail.
    Dropped(DropReason),
}

/// Translates domain events into e-mails.
#[derive(Clone)]
pub struct NotificationOrchestrator {
    directory: Arc<dyn UserDirectory>,
    sink: Arc<dyn EmailSink>,
    timeout: Duration,
}

impl NotificationOrchestrator {
    /// Create an orchestrator resolving users through `directory` and
    /// delivering through `sink`.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, sink: Arc<dyn EmailSink>) -> Self {
        Self {
            directory,
            sink,
            timeout: Duration::from_secs(10),
        }
    }

    /// Bound each lookup and each delivery.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one event to completion.
    pub async fn process(&self, event: &SerializedEvent) -> Outcome {
        let subject = event.event_type.clone();
        let started = Instant::now();

        match self.deliver(event).await {
            Ok(to) => {
                tracing::info!(subject = %subject, to = %to, "Notification delivered");
                metrics::counter!("notifications_delivered_total", "subject" => subject.clone())
                    .increment(1);
                metrics::histogram!("notification_delivery_duration_seconds", "subject" => subject)
                    .record(started.elapsed().as_secs_f64());
                Outcome::Delivered { to }
            }
            Err(reason) => {
                if reason == DropReason::NoRecipient {
                    tracing::debug!(subject = %subject, "Event has nobody to notify");
                } else {
                    tracing::warn!(subject = %subject, reason = %reason, "Notification dropped");
                }
                metrics::counter!(
                    "notifications_dropped_total",
                    "subject" => subject,
                    "reason" => reason.label()
                )
                .increment(1);
                Outcome::Dropped(reason)
            }
        }
    }

    async fn deliver(&self, event: &SerializedEvent) -> Result<String, DropReason> {
        let draft = message::draft(event)?;

        let to = match &draft.recipient {
            Recipient::Address(address) => address.clone(),
            Recipient::User(user) => {
                tokio::time::timeout(self.timeout, self.directory.email_of(user))
                    .await
                    .map_err(|_| DropReason::LookupFailed(format!("lookup of {user} timed out")))?
                    .map_err(|e| DropReason::LookupFailed(e.to_string()))?
            }
        };

        let email = draft.addressed_to(to);
        tokio::time::timeout(self.timeout, self.sink.send(&email))
            .await
            .map_err(|_| DropReason::DeliveryFailed("delivery timed out".to_string()))?
            .map_err(|e| DropReason::DeliveryFailed(e.to_string()))?;
        Ok(email.to)
    }
}

#[async_trait]
impl EventHandler for NotificationOrchestrator {
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
        self.process(event).await;
        Ok(())
    }
}
