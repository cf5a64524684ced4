//! Order lifecycle, edits and bus outages.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use book_exchange_core::environment::Clock;
use book_exchange_core::payloads::{OrderCompleted, OrderCreated, OrderDeleted};
use book_exchange_core::{Error, ObjectId};
use book_exchange_services::orders::{OrderStatus, keys};
use book_exchange_services::{OrdersService, ServiceEnvironment};
use book_exchange_testing::helpers::eventually;
use book_exchange_testing::mocks::{FixedClock, test_clock};
use book_exchange_testing::{FailingEventBus, InMemoryCache, InMemoryDocumentStore};
use common::{Harness, WAIT};
use std::sync::Arc;

#[tokio::test]
async fn create_publishes_orders_created() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let (user, a, b) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

    let order = orders.create_order(&user, &[a, b]).await.unwrap();

    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(
        h.events::<OrderCreated>(),
        vec![OrderCreated {
            order_id: order.id.to_hex(),
            user_id: user.to_hex(),
            book_ids: vec![a.to_hex(), b.to_hex()],
        }]
    );
}

#[tokio::test]
async fn order_without_books_is_invalid() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);

    let result = orders.create_order(&ObjectId::new(), &[]).await;

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn return_publishes_order_completed_once() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let order = orders.create_order(&ObjectId::new(), &[ObjectId::new()]).await.unwrap();

    let returned = orders.return_order(&order.id).await.unwrap();

    assert_eq!(returned.status, OrderStatus::Returned);
    assert!(returned.updated_at > order.updated_at);
    assert!(matches!(orders.return_order(&order.id).await, Err(Error::Conflict(_))));
    assert!(matches!(orders.cancel_order(&order.id).await, Err(Error::Conflict(_))));
    assert_eq!(h.events::<OrderCompleted>().len(), 1);
}

#[tokio::test]
async fn cancel_is_terminal_and_silent() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let order = orders.create_order(&ObjectId::new(), &[ObjectId::new()]).await.unwrap();
    h.bus.clear();

    let cancelled = orders.cancel_order(&order.id).await.unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(h.bus.published().is_empty());
    assert!(matches!(orders.return_order(&order.id).await, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn status_lists_follow_transitions() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let order = orders.create_order(&ObjectId::new(), &[ObjectId::new()]).await.unwrap();

    assert_eq!(orders.list_by_status(OrderStatus::Created).await.unwrap().len(), 1);
    let key = keys::status(OrderStatus::Created).key;
    assert!(eventually(WAIT, || h.cache.contains(&key)).await);

    orders.cancel_order(&order.id).await.unwrap();

    assert!(orders.list_by_status(OrderStatus::Created).await.unwrap().is_empty());
    assert_eq!(orders.list_by_status(OrderStatus::Cancelled).await.unwrap()[0].id, order.id);
}

#[tokio::test]
async fn books_can_be_edited_only_while_created() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
    let order = orders.create_order(&ObjectId::new(), &[a]).await.unwrap();

    assert_eq!(orders.add_book(&order.id, &b).await.unwrap().book_ids, vec![a, b]);
    assert_eq!(orders.remove_book(&order.id, &a).await.unwrap().book_ids, vec![b]);
    assert_eq!(orders.update_books(&order.id, &[c]).await.unwrap().book_ids, vec![c]);
    assert!(matches!(
        orders.update_books(&order.id, &[]).await,
        Err(Error::InvalidArgument(_))
    ));

    orders.return_order(&order.id).await.unwrap();

    assert!(matches!(orders.add_book(&order.id, &a).await, Err(Error::Conflict(_))));
    assert_eq!(orders.get_order(&order.id).await.unwrap().book_ids, vec![c]);
}

#[tokio::test]
async fn updated_at_strictly_increases_on_a_frozen_clock() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(test_clock().now()));
    let h = Harness::with_clock(clock);
    let orders = OrdersService::new(&h.env);
    let (a, b) = (ObjectId::new(), ObjectId::new());
    let order = orders.create_order(&ObjectId::new(), &[a]).await.unwrap();

    let added = orders.add_book(&order.id, &b).await.unwrap();
    let removed = orders.remove_book(&order.id, &a).await.unwrap();
    let cancelled = orders.cancel_order(&order.id).await.unwrap();

    let mut last = order.updated_at;
    for edited in [&added, &removed, &cancelled] {
        assert!(edited.updated_at > last);
        assert!(edited.created_at <= edited.updated_at);
        last = edited.updated_at;
    }
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn delete_publishes_order_deleted() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    let user = ObjectId::new();
    let book = ObjectId::new();
    let order = orders.create_order(&user, &[book]).await.unwrap();
    assert_eq!(orders.list_by_user(&user).await.unwrap().len(), 1);

    orders.delete_order(&order.id).await.unwrap();

    assert!(orders.list_by_user(&user).await.unwrap().is_empty());
    assert!(matches!(orders.get_order(&order.id).await, Err(Error::NotFound { .. })));
    assert_eq!(
        h.events::<OrderDeleted>(),
        vec![OrderDeleted {
            order_id: order.id.to_hex(),
            user_id: user.to_hex(),
            book_ids: vec![book.to_hex()],
        }]
    );
}

#[tokio::test]
async fn bus_outage_does_not_fail_the_write() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let bus = Arc::new(FailingEventBus::new());
    let env = ServiceEnvironment::new(store, Arc::new(InMemoryCache::new()), bus.clone());
    let orders = OrdersService::new(&env);

    let order = orders.create_order(&ObjectId::new(), &[ObjectId::new()]).await.unwrap();

    assert_eq!(bus.attempts(), 1);
    assert_eq!(orders.get_order(&order.id).await.unwrap(), order);
}

#[tokio::test]
async fn store_outage_surfaces_as_store_unavailable() {
    let h = Harness::new();
    let orders = OrdersService::new(&h.env);
    h.store.set_unavailable(true);

    let result = orders.create_order(&ObjectId::new(), &[ObjectId::new()]).await;

    assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    assert!(h.bus.published().is_empty());
}
