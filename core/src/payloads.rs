//! Event payloads, one struct per subject.
//!
//! Identifiers are carried as 24-character hex strings.

use crate::event::DomainEvent;
use crate::subjects;
use serde::{Deserialize, Serialize};

/// Payload of [`subjects::USER_CREATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    /// Id of the new user.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Address the welcome message goes to.
    pub email: String,
}

impl DomainEvent for UserCreated {
    const SUBJECT: &'static str = subjects::USER_CREATED;
}

/// Payload of [`subjects::BOOK_CREATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCreated {
    /// Id of the new book.
    pub id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
}

impl DomainEvent for BookCreated {
    const SUBJECT: &'static str = subjects::BOOK_CREATED;
}

/// Payload of [`subjects::ORDERS_CREATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// Id of the order.
    pub order_id: String,
    /// Customer.
    pub user_id: String,
    /// Ordered books, in order.
    pub book_ids: Vec<String>,
}

impl DomainEvent for OrderCreated {
    const SUBJECT: &'static str = subjects::ORDERS_CREATED;
}

/// Payload of [`subjects::ORDER_COMPLETED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    /// Id of the order.
    pub order_id: String,
    /// Customer.
    pub user_id: String,
    /// Returned books.
    pub book_ids: Vec<String>,
}

impl DomainEvent for OrderCompleted {
    const SUBJECT: &'static str = subjects::ORDER_COMPLETED;
}

/// Payload of [`subjects::ORDER_DELETED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    /// Id of the deleted order.
    pub order_id: String,
    /// Customer.
    pub user_id: String,
    /// Books the order held when it was deleted.
    pub book_ids: Vec<String>,
}

impl DomainEvent for OrderDeleted {
    const SUBJECT: &'static str = subjects::ORDER_DELETED;
}

/// Payload of [`subjects::EXCHANGE_CREATED`].
///
/// `owner_id` and `counterparty_id` are optional on decode so that messages
/// carrying only `offer_id` still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    /// Id of the offer.
    pub offer_id: String,
    /// User who made the offer.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// User the offer is addressed to.
    #[serde(default)]
    pub counterparty_id: Option<String>,
}

impl DomainEvent for OfferCreated {
    const SUBJECT: &'static str = subjects::EXCHANGE_CREATED;
}

/// Payload of [`subjects::EXCHANGE_ACCEPTED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferAccepted {
    /// Id of the offer.
    pub offer_id: String,
    /// User who made the offer.
    pub owner_id: String,
    /// User who accepted it.
    pub requester_id: String,
}

impl DomainEvent for OfferAccepted {
    const SUBJECT: &'static str = subjects::EXCHANGE_ACCEPTED;
}

/// Payload of [`subjects::EXCHANGE_DECLINED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDeclined {
    /// Id of the offer.
    pub offer_id: String,
    /// User who made the offer.
    pub owner_id: String,
}

impl DomainEvent for OfferDeclined {
    const SUBJECT: &'static str = subjects::EXCHANGE_DECLINED;
}

/// Payload of [`subjects::LIBRARY_BOOK_ASSIGNED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAssigned {
    /// Library owner.
    pub user_id: String,
    /// Assigned book.
    pub book_id: String,
}

impl DomainEvent for BookAssigned {
    const SUBJECT: &'static str = subjects::LIBRARY_BOOK_ASSIGNED;
}

/// Payload of [`subjects::LIBRARY_BOOK_UNASSIGNED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUnassigned {
    /// Library owner.
    pub user_id: String,
    /// Removed book.
    pub book_id: String,
}

impl DomainEvent for BookUnassigned {
    const SUBJECT: &'static str = subjects::LIBRARY_BOOK_UNASSIGNED;
}

/// Payload of [`subjects::LIBRARY_ENTRY_DELETED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDeleted {
    /// Id of the deleted entry.
    pub id: String,
    /// Library owner at deletion time.
    pub user_id: String,
}

impl DomainEvent for EntryDeleted {
    const SUBJECT: &'static str = subjects::LIBRARY_ENTRY_DELETED;
}

/// Payload of [`subjects::LIBRARY_ENTRY_UPDATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdated {
    /// Id of the entry.
    pub id: String,
    /// Library owner after the update.
    pub user_id: String,
    /// Book after the update.
    pub book_id: String,
}

impl DomainEvent for EntryUpdated {
    const SUBJECT: &'static str = subjects::LIBRARY_ENTRY_UPDATED;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn offer_created_accepts_bare_offer_id() {
        let event = OfferCreated::from_bytes(br#"{"offer_id":"abc"}"#).expect("should decode");

        assert_eq!(event.offer_id, "abc");
        assert_eq!(event.owner_id, None);
        assert_eq!(event.counterparty_id, None);
    }

    #[test]
    fn accepted_requires_requester() {
        let result = OfferAccepted::from_bytes(br#"{"offer_id":"a","owner_id":"b"}"#);
        assert!(result.is_err());
    }
}
