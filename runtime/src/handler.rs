//! Event handler trait.
//!
//! The [`EventConsumer`](crate::EventConsumer) is generic over what happens
//! to a message: it hands every envelope to an [`EventHandler`] and only
//! logs the outcome. Handlers decide how to decode the payload for the
//! subject the envelope carries.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
//!         println!("{} ({} bytes)", event.event_type, event.data.len());
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use book_exchange_core::event::SerializedEvent;

/// Error returned by a handler. Logged by the consumer, never retried.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one event taken off the bus.
///
/// Implementors must be `Send + Sync + 'static` because one handler is shared
/// by every task the consumer spawns, and the same handler may run
/// interleaved with itself.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Any failure the handler wants logged. The consumer carries on with
    /// subsequent events either way.
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError>;
}
