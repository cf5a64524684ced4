//! Kafka-compatible event bus for Book Exchange.
//!
//! Implements the [`EventBus`] trait from `book-exchange-core` with rdkafka,
//! so services can run against Redpanda, Apache Kafka or any broker speaking
//! the Kafka protocol.
//!
//! # Subjects and topics
//!
//! Every subject (`user.created`, `orders.created`, ...) is published to the
//! topic of the same name. The record key is the subject as well, so one
//! publisher's messages on one subject land in one partition and keep their
//! order.
//!
//! ```text
//! service ──publish("orders.created")──▶ topic orders.created ──▶ consumer group
//!                                                                 book-exchange-notifications
//! ```
//!
//! # Wire format
//!
//! The record payload is `bincode(SerializedEvent)`; the envelope's `data`
//! is the JSON payload and its `event_type` the subject.
//!
//! # Delivery
//!
//! New consumer groups start at the end of each topic (`auto.offset.reset =
//! latest`), so a subscriber never sees messages published before it first
//! joined. Offsets are committed once a message has been handed to the
//! subscriber's stream; handler failures downstream do not cause redelivery.
//!
//! # Example
//!
//! ```no_run
//! use book_exchange_redpanda::RedpandaEventBus;
//! use book_exchange_core::event_bus::EventBus;
//! use book_exchange_core::subjects;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("book-exchange-notifications")
//!     .build()?;
//!
//! let mut stream = event_bus.subscribe(subjects::ALL).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received on {}", event.event_type),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use book_exchange_core::event::SerializedEvent;
use book_exchange_core::event_bus::{EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default subscriber buffer between the Kafka consumer and the stream.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Kafka-compatible [`EventBus`].
///
/// One producer is shared by every publish; each `subscribe` call creates
/// its own consumer, owned by a forwarding task that lives as long as the
/// returned stream.
///
/// # Example
///
/// ```no_run
/// use book_exchange_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create an event bus with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group used when none was configured.
    ///
    /// Derived from the sorted subject list so that restarts of the same
    /// subscriber rejoin the same group.
    #[must_use]
    pub fn default_consumer_group(subjects: &[String]) -> String {
        let mut sorted = subjects.to_vec();
        sorted.sort();
        sorted.dedup();
        format!("book-exchange-{}", sorted.join("-"))
    }

    fn create_consumer(&self, subjects: &[String]) -> Result<(StreamConsumer, String), EventBusError> {
        let group = self
            .consumer_group
            .clone()
            .unwrap_or_else(|| Self::default_consumer_group(subjects));

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| EventBusError::SubscriptionFailed {
                subjects: subjects.to_vec(),
                reason: format!("Failed to create consumer: {e}"),
            })?;

        let topics: Vec<&str> = subjects.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| EventBusError::SubscriptionFailed {
                subjects: subjects.to_vec(),
                reason: format!("Failed to subscribe: {e}"),
            })?;

        Ok((consumer, group))
    }
}

/// Builder for a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all". Default: "1".
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: "none", "gzip", "snappy", "lz4", "zstd". Default: "none".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group for subscriptions.
    ///
    /// Instances sharing a group split the partitions between them. The
    /// notification service sets this so that scaling it out does not send
    /// every e-mail once per instance.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Messages buffered per subscription before the consumer waits.
    /// Default: 1000. Zero is treated as one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts reading. Default: "latest".
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "Event bus producer created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

/// Decode one record into an envelope.
fn decode(message: &BorrowedMessage<'_>) -> Result<SerializedEvent, EventBusError> {
    let payload = message
        .payload()
        .ok_or_else(|| EventBusError::DeserializationFailed("Message has no payload".to_string()))?;
    let event: SerializedEvent = bincode::deserialize(payload)
        .map_err(|e| EventBusError::DeserializationFailed(format!("Failed to decode envelope: {e}")))?;

    if event.event_type != message.topic() {
        tracing::warn!(
            topic = message.topic(),
            subject = %event.event_type,
            "Envelope subject differs from topic"
        );
    }
    Ok(event)
}

/// Own `consumer` and feed decoded records into `tx` until the receiver goes away.
///
/// A record's offset is committed once it has been handed over (or found
/// undecodable), never before.
async fn forward(consumer: StreamConsumer, tx: mpsc::Sender<Result<SerializedEvent, EventBusError>>) {
    use futures::StreamExt;

    let mut stream = consumer.stream();
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if tx.send(decode(&message)).await.is_err() {
            tracing::debug!("Subscriber dropped, stopping consumer");
            break;
        }

        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset"
            );
        }
    }
    tracing::debug!("Consumer task exiting");
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        subject: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let subject = subject.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let payload = bincode::serialize(&event).map_err(|e| EventBusError::PublishFailed {
                subject: subject.clone(),
                reason: format!("Failed to encode envelope: {e}"),
            })?;

            let record = FutureRecord::to(&subject).payload(&payload).key(subject.as_bytes());
            let started = Instant::now();

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    metrics::histogram!("event_bus_publish_duration_seconds", "subject" => subject.clone())
                        .record(started.elapsed().as_secs_f64());
                    tracing::debug!(
                        subject = %subject,
                        partition,
                        offset,
                        size = payload.len(),
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::warn!(subject = %subject, error = %kafka_error, "Failed to publish event");
                    Err(EventBusError::PublishFailed {
                        subject,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subjects: Vec<String> = subjects.iter().map(ToString::to_string).collect();

        Box::pin(async move {
            let (consumer, group) = self.create_consumer(&subjects)?;
            tracing::info!(
                subjects = ?subjects,
                consumer_group = %group,
                buffer_size = self.buffer_size,
                "Subscribed to subjects"
            );

            let (tx, mut rx) = mpsc::channel(self.buffer_size);
            tokio::spawn(forward(consumer, tx));

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
