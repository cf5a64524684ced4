//! Post-commit event emission.
//!
//! Services call [`EventEmitter::emit`] after a repository write returned
//! successfully. A failed publish never fails the write: it is logged and
//! counted, and the caller gets its result as if nothing happened.

use crate::event::{DomainEvent, SerializedEvent};
use crate::event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;

/// Publishes domain events to their subjects.
#[derive(Clone)]
pub struct EventEmitter {
    bus: Arc<dyn EventBus>,
    timeout: Duration,
}

impl EventEmitter {
    /// Create an emitter over a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            timeout: Duration::from_secs(5),
        }
    }

    /// Bound how long a publish may take before it is given up.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish `event` on its subject.
    ///
    /// Returns `true` if the bus accepted the message.
    pub async fn emit<E: DomainEvent>(&self, event: &E) -> bool {
        let subject = E::SUBJECT;
        let envelope = match SerializedEvent::from_event(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(subject, error = %e, "Failed to encode event");
                metrics::counter!("event_publish_failures_total", "subject" => subject).increment(1);
                return false;
            }
        };

        match tokio::time::timeout(self.timeout, self.bus.publish(subject, &envelope)).await {
            Ok(Ok(())) => {
                tracing::debug!(subject, size = envelope.data.len(), "Event published");
                metrics::counter!("events_published_total", "subject" => subject).increment(1);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(subject, error = %e, "Event bus degraded, event dropped");
                metrics::counter!("event_publish_failures_total", "subject" => subject).increment(1);
                false
            }
            Err(_) => {
                tracing::warn!(subject, timeout = ?self.timeout, "Event publish timed out, event dropped");
                metrics::counter!("event_publish_failures_total", "subject" => subject).increment(1);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBusError, EventStream};
    use crate::payloads::BookCreated;
    use crate::subjects;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, SerializedEvent)>>,
        fail: bool,
    }

    impl EventBus for RecordingBus {
        fn publish(
            &self,
            subject: &str,
            event: &SerializedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            let subject = subject.to_string();
            let event = event.clone();
            Box::pin(async move {
                if self.fail {
                    return Err(EventBusError::ConnectionFailed("down".to_string()));
                }
                if let Ok(mut published) = self.published.lock() {
                    published.push((subject, event));
                }
                Ok(())
            })
        }

        fn subscribe(
            &self,
            subjects: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
            let subjects = subjects.iter().map(ToString::to_string).collect();
            Box::pin(async move {
                Err(EventBusError::SubscriptionFailed {
                    subjects,
                    reason: "not supported".to_string(),
                })
            })
        }
    }

    fn book_created() -> BookCreated {
        BookCreated {
            id: "aaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            title: "X".to_string(),
            author: "Y".to_string(),
        }
    }

    #[tokio::test]
    #[allow(clippy::expect_used)]
    async fn emit_publishes_on_event_subject() {
        let bus = Arc::new(RecordingBus::default());
        let emitter = EventEmitter::new(bus.clone());

        assert!(emitter.emit(&book_created()).await);

        let published = bus.published.lock().expect("lock");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, subjects::BOOK_CREATED);
        assert_eq!(published[0].1.event_type, subjects::BOOK_CREATED);
    }

    #[tokio::test]
    async fn emit_swallows_bus_failure() {
        let bus = Arc::new(RecordingBus {
            fail: true,
            ..RecordingBus::default()
        });
        let emitter = EventEmitter::new(bus);

        assert!(!emitter.emit(&book_created()).await);
    }
}
