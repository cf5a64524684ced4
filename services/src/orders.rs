//! Orders.
//!
//! An order starts `Created` and moves once to `Cancelled` or `Returned`.
//! Its book list can only be edited while it is `Created`; deleting is
//! allowed in any state.

use crate::guarded::{Versioned, guarded_write};
use crate::ServiceEnvironment;
use book_exchange_core::cache::ttl;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::environment::{Clock, rfc3339_micros, truncate_micros};
use book_exchange_core::payloads::{OrderCompleted, OrderCreated, OrderDeleted};
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{DateTime, Error, ObjectId, Result, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Placed; books can still be changed.
    Created,
    /// Called off.
    Cancelled,
    /// Books came back.
    Returned,
}

impl OrderStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Cancelled => "Cancelled",
            Self::Returned => "Returned",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "returned" => Ok(Self::Returned),
            _ => Err(Error::InvalidArgument(format!("unknown order status {s:?}"))),
        }
    }
}

/// An order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Id.
    pub id: ObjectId,
    /// Customer.
    pub user_id: ObjectId,
    /// Ordered books, in order.
    #[serde(default)]
    pub book_ids: Vec<ObjectId>,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Creation time.
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
    /// Time of the last write.
    #[serde(with = "rfc3339_micros")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    const FAMILY: &'static str = "order";
    const COLLECTION: CollectionSpec = CollectionSpec::new("orders");

    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Versioned for Order {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Serialize)]
struct StoredOrder<'a> {
    user_id: &'a ObjectId,
    book_ids: &'a [ObjectId],
    status: OrderStatus,
    #[serde(with = "rfc3339_micros")]
    created_at: DateTime<Utc>,
    #[serde(with = "rfc3339_micros")]
    updated_at: DateTime<Utc>,
}

/// List keys.
pub mod keys {
    use super::{ListKey, ObjectId, OrderStatus, ttl};

    /// Every order.
    #[must_use]
    pub fn all() -> ListKey {
        ListKey::new("orders", "all", ttl::VOLATILE_LIST)
    }

    /// Orders of one user.
    #[must_use]
    pub fn user(user: &ObjectId) -> ListKey {
        ListKey::new("user_orders", user, ttl::FILTER_LIST)
    }

    /// Orders in one status.
    #[must_use]
    pub fn status(status: OrderStatus) -> ListKey {
        ListKey::new("orders", format!("status:{status}"), ttl::FILTER_LIST)
    }
}

fn affected_keys(order: &Order) -> Vec<String> {
    vec![
        keys::all().key,
        keys::user(&order.user_id).key,
        keys::status(order.status).key,
    ]
}

fn ensure_created(order: &Order) -> Result<()> {
    if order.status == OrderStatus::Created {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "order {} is already {}",
            order.id, order.status
        )))
    }
}

/// Order use cases.
#[derive(Clone)]
pub struct OrdersService {
    orders: CachedRepository<Order>,
    emitter: EventEmitter,
    clock: Arc<dyn Clock>,
}

impl OrdersService {
    /// Create the service.
    #[must_use]
    pub fn new(env: &ServiceEnvironment) -> Self {
        Self {
            orders: env.repository(),
            emitter: env.emitter.clone(),
            clock: Arc::clone(&env.clock),
        }
    }

    /// Place an order and publish `orders.created`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `books` is empty
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn create_order(&self, user: &ObjectId, books: &[ObjectId]) -> Result<Order> {
        if books.is_empty() {
            return Err(Error::InvalidArgument("an order needs at least one book".to_string()));
        }

        let now = truncate_micros(self.clock.now());
        let stored = StoredOrder {
            user_id: user,
            book_ids: books,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        };
        let created = self.orders.insert(&stored, affected_keys).await?;
        tracing::info!(order_id = %created.id, user_id = %user, books = books.len(), "Order created");

        self.emitter
            .emit(&OrderCreated {
                order_id: created.id.to_hex(),
                user_id: created.user_id.to_hex(),
                book_ids: hex_ids(&created.book_ids),
            })
            .await;
        Ok(created)
    }

    /// One order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_order(&self, id: &ObjectId) -> Result<Order> {
        self.orders.get(id).await
    }

    /// Cancel a `Created` order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::Conflict`] if the order already left `Created`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn cancel_order(&self, id: &ObjectId) -> Result<Order> {
        let cancelled = self.transition(id, OrderStatus::Cancelled).await?;
        tracing::info!(order_id = %id, "Order cancelled");
        Ok(cancelled)
    }

    /// Mark a `Created` order returned and publish `order.completed`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::Conflict`] if the order already left `Created`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn return_order(&self, id: &ObjectId) -> Result<Order> {
        let returned = self.transition(id, OrderStatus::Returned).await?;
        tracing::info!(order_id = %id, "Order returned");

        self.emitter
            .emit(&OrderCompleted {
                order_id: returned.id.to_hex(),
                user_id: returned.user_id.to_hex(),
                book_ids: hex_ids(&returned.book_ids),
            })
            .await;
        Ok(returned)
    }

    /// Delete an order in any state and publish `order.deleted`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn delete_order(&self, id: &ObjectId) -> Result<Order> {
        let deleted = self.orders.delete(id, affected_keys).await?;
        tracing::info!(order_id = %id, "Order deleted");

        self.emitter
            .emit(&OrderDeleted {
                order_id: deleted.id.to_hex(),
                user_id: deleted.user_id.to_hex(),
                book_ids: hex_ids(&deleted.book_ids),
            })
            .await;
        Ok(deleted)
    }

    /// Replace the book list of a `Created` order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `books` is empty
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::Conflict`] if the order already left `Created`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn update_books(&self, id: &ObjectId, books: &[ObjectId]) -> Result<Order> {
        if books.is_empty() {
            return Err(Error::InvalidArgument("an order needs at least one book".to_string()));
        }
        self.edit(id, |_| Update::new().set("book_ids", books)).await
    }

    /// Append a book to a `Created` order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::Conflict`] if the order already left `Created`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn add_book(&self, id: &ObjectId, book: &ObjectId) -> Result<Order> {
        self.edit(id, |_| Update::new().push("book_ids", book)).await
    }

    /// Remove every copy of a book from a `Created` order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such order
    /// - [`Error::Conflict`] if the order already left `Created`
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn remove_book(&self, id: &ObjectId, book: &ObjectId) -> Result<Order> {
        self.edit(id, |_| Update::new().pull("book_ids", book)).await
    }

    /// Orders of one user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_user(&self, user: &ObjectId) -> Result<Vec<Order>> {
        self.orders
            .list(&keys::user(user), &Query::filter(Filter::eq("user_id", user)))
            .await
    }

    /// Every order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.orders.list(&keys::all(), &Query::all()).await
    }

    /// Orders in one status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.orders
            .list(&keys::status(status), &Query::filter(Filter::eq("status", status)))
            .await
    }

    async fn transition(&self, id: &ObjectId, to: OrderStatus) -> Result<Order> {
        guarded_write(
            &self.orders,
            self.clock.as_ref(),
            id,
            ensure_created,
            |_| Update::new().set("status", to),
            affected_keys,
        )
        .await
    }

    async fn edit<B>(&self, id: &ObjectId, build: B) -> Result<Order>
    where
        B: Fn(&Order) -> Update,
    {
        guarded_write(
            &self.orders,
            self.clock.as_ref(),
            id,
            ensure_created,
            build,
            affected_keys,
        )
        .await
    }
}

fn hex_ids(ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(ObjectId::to_hex).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keys_use_wire_names() {
        assert_eq!(keys::status(OrderStatus::Returned).key, "orders:status:Returned");
        assert_eq!(
            keys::user(&ObjectId::from_bytes([1; 12])).key,
            "user_orders:010101010101010101010101"
        );
    }

    #[test]
    fn status_accepts_both_spellings_of_cancelled() {
        assert_eq!("canceled".parse::<OrderStatus>().ok(), Some(OrderStatus::Cancelled));
        assert_eq!("Cancelled".parse::<OrderStatus>().ok(), Some(OrderStatus::Cancelled));
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_created_orders_are_editable() {
        let now = Utc::now();
        let mut order = Order {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            book_ids: Vec::new(),
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        };
        assert!(ensure_created(&order).is_ok());
        order.status = OrderStatus::Returned;
        assert!(matches!(ensure_created(&order), Err(Error::Conflict(_))));
    }
}
