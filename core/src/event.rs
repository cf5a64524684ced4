//! Domain events and the envelope they travel in.
//!
//! Every write path that has a declared subject produces one domain event
//! after its store commit. The event payload is serialised to compact JSON and
//! wrapped in a [`SerializedEvent`] whose `event_type` is the subject it is
//! published on.
//!
//! # Example
//!
//! ```
//! use book_exchange_core::event::{DomainEvent, SerializedEvent};
//! use book_exchange_core::payloads::BookCreated;
//! use book_exchange_core::subjects;
//!
//! let event = BookCreated {
//!     id: "aaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
//!     title: "Dune".to_string(),
//!     author: "Frank Herbert".to_string(),
//! };
//!
//! let envelope = SerializedEvent::from_event(&event).unwrap();
//! assert_eq!(envelope.event_type, subjects::BOOK_CREATED);
//! ```

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize an event payload.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize an event payload.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// The envelope carries a subject that no payload type is bound to.
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),
}

/// A domain event bound to exactly one bus subject.
///
/// Field names of implementors are part of the wire contract: consumers
/// decode payloads by name, so renaming a field is a breaking change.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The subject this event is published on. Must be one of [`crate::subjects`].
    const SUBJECT: &'static str;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are not a
    /// valid payload for this subject.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for the bus.
///
/// `event_type` holds the subject; `data` holds the JSON payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// The subject the event was published on (e.g. `"orders.created"`).
    pub event_type: String,

    /// The JSON-encoded payload.
    pub data: Vec<u8>,

    /// Optional metadata.
    ///
    /// Transport adapters may attach fields such as `published_at` here;
    /// payload decoding never depends on it.
    pub metadata: Option<String>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, data: Vec<u8>, metadata: Option<String>) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Wrap a domain event in an envelope addressed to its subject.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be serialized.
    pub fn from_event<E: DomainEvent>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: E::SUBJECT.to_string(),
            data: event.to_bytes()?,
            metadata: None,
        })
    }

    /// Decode the payload as `E`, checking the subject first.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownSubject`] if the envelope was not
    /// published on `E::SUBJECT`, or [`EventError::DeserializationError`]
    /// if the payload does not decode.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, EventError> {
        if self.event_type != E::SUBJECT {
            return Err(EventError::UnknownSubject(self.event_type.clone()));
        }
        E::from_bytes(&self.data)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ subject: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}
