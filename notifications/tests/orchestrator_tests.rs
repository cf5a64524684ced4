//! Orchestrator behaviour against recording doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use book_exchange_core::ObjectId;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::event::SerializedEvent;
use book_exchange_core::payloads::{
    BookCreated, EntryUpdated, OfferAccepted, OfferCreated, OrderCreated, UserCreated,
};
use book_exchange_core::subjects;
use book_exchange_notifications::mocks::{InMemoryUserDirectory, RecordingEmailSink};
use book_exchange_notifications::{DropReason, NotificationOrchestrator, Outcome};
use book_exchange_runtime::EventConsumer;
use book_exchange_testing::InMemoryEventBus;
use book_exchange_testing::helpers::eventually;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Fixture {
    directory: InMemoryUserDirectory,
    sink: RecordingEmailSink,
    orchestrator: NotificationOrchestrator,
}

fn fixture() -> Fixture {
    let directory = InMemoryUserDirectory::new();
    let sink = RecordingEmailSink::new();
    let orchestrator =
        NotificationOrchestrator::new(Arc::new(directory.clone()), Arc::new(sink.clone()));
    Fixture {
        directory,
        sink,
        orchestrator,
    }
}

fn envelope<E: book_exchange_core::event::DomainEvent>(event: &E) -> SerializedEvent {
    SerializedEvent::from_event(event).unwrap()
}

#[tokio::test]
async fn signup_sends_welcome_without_lookup() {
    let f = fixture();
    let event = envelope(&UserCreated {
        id: "aaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
        name: "Ada".to_string(),
        email: "ada@example.org".to_string(),
    });

    let outcome = f.orchestrator.process(&event).await;

    assert_eq!(
        outcome,
        Outcome::Delivered {
            to: "ada@example.org".to_string()
        }
    );
    let sent = f.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.org");
    assert!(sent[0].body.contains("Ada"));
    assert_eq!(f.directory.lookups(), 0);
}

#[tokio::test]
async fn order_confirmation_goes_to_the_looked_up_address() {
    let f = fixture();
    let user = ObjectId::new();
    f.directory.insert(user, "u1@x");
    let order_id = ObjectId::new().to_hex();

    f.orchestrator
        .process(&envelope(&OrderCreated {
            order_id: order_id.clone(),
            user_id: user.to_hex(),
            book_ids: vec!["b1".to_string(), "b2".to_string()],
        }))
        .await;

    let sent = f.sink.sent_to("u1@x");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Order confirmation");
    assert!(sent[0].body.contains(&order_id));
}

#[tokio::test]
async fn entry_update_mentions_the_new_book() {
    let f = fixture();
    let user = ObjectId::new();
    f.directory.insert(user, "reader@example.org");

    f.orchestrator
        .process(&envelope(&EntryUpdated {
            id: ObjectId::new().to_hex(),
            user_id: user.to_hex(),
            book_id: "b2".to_string(),
        }))
        .await;

    let sent = f.sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("b2"));
}

#[tokio::test]
async fn lookup_failure_drops_without_touching_the_sink() {
    let f = fixture();
    f.directory.set_unavailable(true);

    let outcome = f
        .orchestrator
        .process(&envelope(&OfferAccepted {
            offer_id: ObjectId::new().to_hex(),
            owner_id: ObjectId::new().to_hex(),
            requester_id: ObjectId::new().to_hex(),
        }))
        .await;

    assert!(matches!(outcome, Outcome::Dropped(DropReason::LookupFailed(_))));
    assert_eq!(f.directory.lookups(), 1);
    assert!(f.sink.sent().is_empty());
}

#[tokio::test]
async fn unknown_user_is_a_lookup_failure() {
    let f = fixture();

    let outcome = f
        .orchestrator
        .process(&envelope(&OfferCreated {
            offer_id: ObjectId::new().to_hex(),
            owner_id: Some(ObjectId::new().to_hex()),
            counterparty_id: None,
        }))
        .await;

    assert!(matches!(outcome, Outcome::Dropped(DropReason::LookupFailed(_))));
    assert!(f.sink.sent().is_empty());
}

#[tokio::test]
async fn sink_failure_is_reported_as_dropped() {
    let f = fixture();
    f.sink.set_failing(true);

    let outcome = f
        .orchestrator
        .process(&envelope(&UserCreated {
            id: ObjectId::new().to_hex(),
            name: "Bob".to_string(),
            email: "bob@example.org".to_string(),
        }))
        .await;

    assert!(matches!(outcome, Outcome::Dropped(DropReason::DeliveryFailed(_))));
}

#[tokio::test]
async fn book_created_notifies_nobody() {
    let f = fixture();

    let outcome = f
        .orchestrator
        .process(&envelope(&BookCreated {
            id: ObjectId::new().to_hex(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
        }))
        .await;

    assert_eq!(outcome, Outcome::Dropped(DropReason::NoRecipient));
    assert_eq!(f.directory.lookups(), 0);
}

#[tokio::test]
async fn malformed_envelope_is_dropped() {
    let f = fixture();
    let event = SerializedEvent::new(subjects::USER_CREATED.to_string(), b"not json".to_vec(), None);

    let outcome = f.orchestrator.process(&event).await;

    assert!(matches!(outcome, Outcome::Dropped(DropReason::Malformed(_))));
    assert!(f.sink.sent().is_empty());
}

#[tokio::test]
async fn consumer_delivers_events_emitted_on_the_bus() {
    let f = fixture();
    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::builder()
        .name("notifications")
        .subjects(subjects::ALL.iter().map(ToString::to_string).collect())
        .event_bus(Arc::new(bus.clone()))
        .handler(Arc::new(f.orchestrator.clone()))
        .shutdown(shutdown_rx)
        .build()
        .unwrap();
    let handle = consumer.spawn();
    assert!(eventually(Duration::from_secs(1), || bus.subscriber_count() == 1).await);

    let emitter = EventEmitter::new(Arc::new(bus.clone()));
    let user = ObjectId::new();
    f.directory.insert(user, "owner@example.org");
    for n in 0..5 {
        emitter
            .emit(&UserCreated {
                id: ObjectId::new().to_hex(),
                name: format!("User {n}"),
                email: format!("user{n}@example.org"),
            })
            .await;
    }
    emitter
        .emit(&OfferCreated {
            offer_id: ObjectId::new().to_hex(),
            owner_id: Some(user.to_hex()),
            counterparty_id: Some(ObjectId::new().to_hex()),
        })
        .await;

    assert!(eventually(Duration::from_secs(2), || f.sink.sent().len() == 6).await);
    assert_eq!(f.sink.sent_to("owner@example.org")[0].subject, "Exchange offer created");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("consumer drains")
        .unwrap();
}
