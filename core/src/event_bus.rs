//! Subject-addressed publish/subscribe.
//!
//! Services publish a domain event to a fixed subject right after the store
//! commit that produced it; the notification service subscribes to every
//! subject and fans events out to e-mail.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Request   │
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────────┐
//! │ 1. Store commit │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Invalidate   │
//! │    cache keys   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 3. Publish to   │◄─── Fire-and-forget
//! │    subject      │
//! └────────┬────────┘
//!          │
//!     ┌────┴────┐
//!     │         │
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Notif.│ │ Other │
//! └───────┘ └───────┘
//! ```
//!
//! # Guarantees
//!
//! - **Best effort**: a successful publish only means the bus accepted the message
//! - **No durability**: messages published while nobody is subscribed are lost
//! - **Ordered per publisher**: one publisher's messages on one subject arrive in order
//! - **No redelivery**: a handler that fails does not see the message again
//!
//! Subjects are listed in [`crate::subjects`].
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (in `book-exchange-testing`): in-process, for tests
//! - `RedpandaEventBus` (in `book-exchange-redpanda`): Kafka-compatible broker
//!
//! # Example
//!
//! ```rust,ignore
//! use book_exchange_core::event_bus::EventBus;
//! use book_exchange_core::subjects;
//! use futures::StreamExt;
//!
//! async fn example(event_bus: impl EventBus) {
//!     let mut stream = event_bus.subscribe(subjects::ALL).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(event) => println!("Received on {}", event.event_type),
//!             Err(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a subject
    #[error("Publish failed for subject '{subject}': {reason}")]
    PublishFailed {
        /// The subject that failed
        subject: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to subjects
    #[error("Subscription failed for subjects {subjects:?}: {reason}")]
    SubscriptionFailed {
        /// The subjects that failed to subscribe
        subjects: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize a message
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from a subscription.
///
/// Dropping the stream unsubscribes.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; one bus client is shared by
/// every request handler of a process.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so services can hold an `Arc<dyn EventBus>` and swap transports at startup.
pub trait EventBus: Send + Sync {
    /// Publish an event to a subject.
    ///
    /// Returns once the message has been handed to the bus. There is no
    /// delivery confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] or
    /// [`EventBusError::ConnectionFailed`] if the bus did not accept the message.
    fn publish(
        &self,
        subject: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more subjects and receive a stream of events.
    ///
    /// Only messages published after the subscription is established are
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
