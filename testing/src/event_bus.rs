//! In-memory event buses.
//!
//! [`InMemoryEventBus`] routes by exact subject to every live subscriber and
//! keeps a log of everything published, so tests can assert on emitted
//! events without a broker. [`FailingEventBus`] refuses every operation, for
//! exercising the degraded-bus paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use book_exchange_core::event::SerializedEvent;
use book_exchange_core::event_bus::{EventBus, EventBusError, EventStream};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Subscriber {
    subjects: HashSet<String>,
    sender: mpsc::UnboundedSender<SerializedEvent>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    published: Vec<(String, SerializedEvent)>,
}

/// In-process event bus.
///
/// Messages published before a subscription exists are recorded but never
/// delivered to it, matching the at-most-once bus the services run against.
///
/// # Example
///
/// ```
/// use book_exchange_testing::InMemoryEventBus;
/// use book_exchange_core::event_bus::EventBus;
/// use book_exchange_core::event::SerializedEvent;
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["user.created"]).await.unwrap();
///
/// let event = SerializedEvent::new("user.created".to_string(), b"{}".to_vec(), None);
/// bus.publish("user.created", &event).await.unwrap();
///
/// assert_eq!(stream.next().await.unwrap().unwrap(), event);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(subject, event)` published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.state.lock().unwrap().published.clone()
    }

    /// Events published on one subject, in order.
    #[must_use]
    pub fn published_on(&self, subject: &str) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of subscriptions whose stream is still alive.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|s| !s.sender.is_closed());
        state.subscribers.len()
    }

    /// Forget the publish log.
    pub fn clear(&self) {
        self.state.lock().unwrap().published.clear();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        subject: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let subject = subject.to_string();
        let event = event.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.subscribers.retain(|s| !s.sender.is_closed());
            for subscriber in &state.subscribers {
                if subscriber.subjects.contains(&subject) {
                    let _ = subscriber.sender.send(event.clone());
                }
            }
            state.published.push((subject, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subjects: HashSet<String> = subjects.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            self.state
                .lock()
                .unwrap()
                .subscribers
                .push(Subscriber { subjects, sender });

            let stream = async_stream::stream! {
                while let Some(event) = receiver.recv().await {
                    yield Ok(event);
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// Event bus that is always unreachable.
#[derive(Clone, Default)]
pub struct FailingEventBus {
    attempts: Arc<AtomicUsize>,
}

impl FailingEventBus {
    /// Create a failing bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventBus for FailingEventBus {
    fn publish(
        &self,
        _subject: &str,
        _event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(EventBusError::ConnectionFailed("bus unreachable".to_string())) })
    }

    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subjects = subjects.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            Err(EventBusError::SubscriptionFailed {
                subjects,
                reason: "bus unreachable".to_string(),
            })
        })
    }
}
