//! Event bus consumer with automatic reconnection.
//!
//! `EventConsumer` does the boilerplate of consuming events: subscribing with
//! retry, dispatching each event to an [`EventHandler`] on its own task,
//! reconnecting when the stream ends, and draining in-flight handlers on
//! shutdown.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe(subjects)
//!         ok  → loop {
//!                   wait for a free slot (max_in_flight)
//!                   next event → spawn handler task
//!                   shutdown?  → stop reading
//!               }
//!         err → wait retry_delay
//! }
//! drain in-flight handler tasks (bounded by drain_timeout)
//! ```
//!
//! Handlers run concurrently with each other and with the reading loop, so a
//! slow delivery does not hold up the events behind it. A handler error is
//! logged and the event is not redelivered.
//!
//! # Example
//!
//! ```rust,ignore
//! use book_exchange_runtime::EventConsumer;
//!
//! let consumer = EventConsumer::builder()
//!     .name("notifications")
//!     .subjects(vec!["user.created".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_rx)
//!     .max_in_flight(32)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::handler::EventHandler;
use book_exchange_core::event::SerializedEvent;
use book_exchange_core::event_bus::{EventBus, EventBusError};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Errors from building a consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// A required builder field was not set.
    #[error("Consumer {0} is required")]
    MissingField(&'static str),

    /// `max_in_flight` was zero.
    #[error("Consumer max_in_flight must be at least 1")]
    ZeroConcurrency,
}

/// Why processing of one subscription stopped.
enum Flow {
    Shutdown,
    StreamEnded,
}

/// Event bus consumer.
///
/// # Lifecycle
///
/// 1. Created via [`EventConsumer::builder`]
/// 2. Spawned as background task via [`EventConsumer::spawn`]
/// 3. Runs until the shutdown signal fires, then drains its handler tasks
pub struct EventConsumer {
    name: String,
    subjects: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    drain_timeout: Duration,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl EventConsumer {
    /// Default delay before resubscribing.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// Default bound on concurrently running handlers.
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

    /// Default time handlers get to finish after shutdown.
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Consumer name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the consumer as a background task.
    ///
    /// The returned handle completes once the consumer has stopped reading
    /// and its in-flight handlers have finished or the drain timed out.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, subjects = ?self.subjects, "Event consumer started");

        loop {
            let subjects: Vec<&str> = self.subjects.iter().map(String::as_str).collect();

            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                result = self.event_bus.subscribe(&subjects) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(consumer = %self.name, "Subscribed to event bus");
                    match self.process_stream(&mut stream).await {
                        Flow::Shutdown => break,
                        Flow::StreamEnded => {
                            warn!(
                                consumer = %self.name,
                                retry_delay = ?self.retry_delay,
                                "Event stream ended, reconnecting"
                            );
                        }
                    }
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        retry_delay = ?self.retry_delay,
                        "Failed to subscribe to event bus"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.drain().await;
        info!(consumer = %self.name, "Event consumer stopped");
    }

    async fn process_stream<S>(&mut self, stream: &mut S) -> Flow
    where
        S: Stream<Item = Result<SerializedEvent, EventBusError>> + Unpin + Send,
    {
        loop {
            self.reap_finished();

            let permit = tokio::select! {
                _ = self.shutdown.recv() => return Flow::Shutdown,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Flow::Shutdown,
                },
            };

            let next = tokio::select! {
                _ = self.shutdown.recv() => return Flow::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    metrics::counter!("event_bus_messages_consumed_total", "subject" => event.event_type.clone())
                        .increment(1);
                    debug!(consumer = %self.name, subject = %event.event_type, "Event received");

                    let handler = Arc::clone(&self.handler);
                    let name = self.name.clone();
                    self.tasks.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = handler.handle(&event).await {
                            error!(
                                consumer = %name,
                                subject = %event.event_type,
                                error = %e,
                                "Failed to handle event"
                            );
                        }
                    });
                }
                Some(Err(e)) => {
                    metrics::counter!("event_bus_consume_errors_total").increment(1);
                    error!(consumer = %self.name, error = %e, "Error receiving event from stream");
                }
                None => return Flow::StreamEnded,
            }
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                error!(consumer = %self.name, error = %e, "Handler task panicked");
            }
        }
    }

    async fn drain(&mut self) {
        let in_flight = self.tasks.len();
        if in_flight == 0 {
            return;
        }
        info!(consumer = %self.name, in_flight, "Draining in-flight handlers");

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Handler task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                consumer = %self.name,
                remaining = self.tasks.len(),
                "Drain timed out, aborting remaining handlers"
            );
            self.tasks.abort_all();
        }
    }
}

/// Builder for an [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    subjects: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
    max_in_flight: Option<usize>,
    drain_timeout: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set subjects to subscribe to.
    #[must_use]
    pub fn subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = Some(subjects);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set delay before resubscribing (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Bound concurrently running handlers (default: 64).
    #[must_use]
    pub const fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }

    /// Time handlers get to finish after shutdown (default: 10 seconds).
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Build the consumer.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::MissingField`] if name, subjects, event bus, handler
    ///   or shutdown receiver is not set
    /// - [`ConsumerError::ZeroConcurrency`] if `max_in_flight` is zero
    pub fn build(self) -> Result<EventConsumer, ConsumerError> {
        let max_in_flight = self
            .max_in_flight
            .unwrap_or(EventConsumer::DEFAULT_MAX_IN_FLIGHT);
        if max_in_flight == 0 {
            return Err(ConsumerError::ZeroConcurrency);
        }

        Ok(EventConsumer {
            name: self.name.ok_or(ConsumerError::MissingField("name"))?,
            subjects: self.subjects.ok_or(ConsumerError::MissingField("subjects"))?,
            event_bus: self.event_bus.ok_or(ConsumerError::MissingField("event_bus"))?,
            handler: self.handler.ok_or(ConsumerError::MissingField("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerError::MissingField("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(EventConsumer::DEFAULT_RETRY_DELAY),
            drain_timeout: self
                .drain_timeout
                .unwrap_or(EventConsumer::DEFAULT_DRAIN_TIMEOUT),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            tasks: JoinSet::new(),
        })
    }
}
