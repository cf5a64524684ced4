//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Covered:
//! - publish/subscribe on a subject
//! - subject isolation (a subscriber only sees its own subjects)
//! - one consumer group splitting the work between subscribers
//! - typed payload round trip through the envelope
//!
//! # Running These Tests
//!
//! Ignored by default: they need Docker and take a while to start Kafka.
//!
//! ```bash
//! cargo test -p book-exchange-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use book_exchange_core::event::SerializedEvent;
use book_exchange_core::event_bus::{EventBus, EventStream};
use book_exchange_core::payloads::OrderCreated;
use book_exchange_core::subjects;
use book_exchange_redpanda::RedpandaEventBus;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

const WARMUP: &str = "warmup";

fn envelope(subject: &str, body: &str) -> SerializedEvent {
    SerializedEvent::new(subject.to_string(), body.as_bytes().to_vec(), None)
}

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    for attempt in 1..=60 {
        if let Ok(bus) = RedpandaEventBus::new(&brokers) {
            if bus.publish(WARMUP, &envelope(WARMUP, "{}")).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return (kafka, brokers);
            }
        }
        assert!(attempt != 60, "Kafka failed to become ready");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    unreachable!("readiness loop returns or panics")
}

/// Publish once so the topic is auto-created, then let metadata settle.
async fn ensure_subject_exists(bus: &RedpandaEventBus, subject: &str) {
    for attempt in 1..=30 {
        if bus.publish(subject, &envelope(WARMUP, "{}")).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        assert!(attempt != 30, "Failed to create topic for {subject}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Collect `count` non-warmup events or give up after `timeout`.
async fn collect(stream: &mut EventStream, count: usize, timeout: Duration) -> Vec<SerializedEvent> {
    let mut received = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while received.len() < count {
            match stream.next().await {
                Some(Ok(event)) if event.event_type != WARMUP => received.push(event),
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    received
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_and_subscribe_on_subject() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_subject_exists(&bus, subjects::USER_CREATED).await;

    let mut stream = bus
        .subscribe(&[subjects::USER_CREATED])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    bus.publish(subjects::USER_CREATED, &envelope(subjects::USER_CREATED, r#"{"n":1}"#))
        .await
        .expect("publish 1");
    bus.publish(subjects::USER_CREATED, &envelope(subjects::USER_CREATED, r#"{"n":2}"#))
        .await
        .expect("publish 2");

    let received = collect(&mut stream, 2, Duration::from_secs(10)).await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].data, br#"{"n":1}"#.to_vec());
    assert_eq!(received[1].data, br#"{"n":2}"#.to_vec());
    assert!(received.iter().all(|e| e.event_type == subjects::USER_CREATED));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_subscriber_only_sees_its_subjects() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_subject_exists(&bus, subjects::BOOK_CREATED).await;
    ensure_subject_exists(&bus, subjects::ORDER_DELETED).await;

    let mut stream = bus
        .subscribe(&[subjects::BOOK_CREATED])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    bus.publish(subjects::ORDER_DELETED, &envelope(subjects::ORDER_DELETED, "{}"))
        .await
        .expect("publish other");
    bus.publish(subjects::BOOK_CREATED, &envelope(subjects::BOOK_CREATED, "{}"))
        .await
        .expect("publish own");

    let received = collect(&mut stream, 2, Duration::from_secs(8)).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_type, subjects::BOOK_CREATED);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_consumer_group_splits_messages() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("book-exchange-notifications-test")
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_subject_exists(&bus, subjects::ORDERS_CREATED).await;

    let mut first = bus
        .subscribe(&[subjects::ORDERS_CREATED])
        .await
        .expect("subscribe 1");
    let mut second = bus
        .subscribe(&[subjects::ORDERS_CREATED])
        .await
        .expect("subscribe 2");
    tokio::time::sleep(Duration::from_secs(5)).await;

    for n in 0..10 {
        bus.publish(
            subjects::ORDERS_CREATED,
            &envelope(subjects::ORDERS_CREATED, &format!("{{\"n\":{n}}}")),
        )
        .await
        .expect("publish");
    }

    let (a, b) = tokio::join!(
        collect(&mut first, 10, Duration::from_secs(10)),
        collect(&mut second, 10, Duration::from_secs(10)),
    );
    let unique: HashSet<Vec<u8>> = a.iter().chain(b.iter()).map(|e| e.data.clone()).collect();
    assert_eq!(unique.len(), 10, "every message is seen by the group");
    assert_eq!(a.len() + b.len(), 10, "no message is seen twice in one group");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_typed_payload_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_subject_exists(&bus, subjects::ORDERS_CREATED).await;

    let mut stream = bus
        .subscribe(&[subjects::ORDERS_CREATED])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let order = OrderCreated {
        order_id: "0123456789abcdef01234567".to_string(),
        user_id: "aaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
        book_ids: vec!["b1".to_string(), "b2".to_string()],
    };
    let sent = SerializedEvent::from_event(&order).expect("encode");
    bus.publish(subjects::ORDERS_CREATED, &sent).await.expect("publish");

    let received = collect(&mut stream, 1, Duration::from_secs(10)).await;
    assert_eq!(received.len(), 1);
    let decoded: OrderCreated = received[0].decode().expect("decode");
    assert_eq!(decoded, order);
}
