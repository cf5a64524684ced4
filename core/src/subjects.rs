//! Bus subjects.
//!
//! Publishers and subscribers both import these constants; no subject string
//! is spelled anywhere else in the workspace.

/// A user account was created.
pub const USER_CREATED: &str = "user.created";

/// A book was added to the catalogue.
pub const BOOK_CREATED: &str = "book.created";

/// An order was placed.
pub const ORDERS_CREATED: &str = "orders.created";

/// An order was returned.
pub const ORDER_COMPLETED: &str = "order.completed";

/// An order was deleted.
pub const ORDER_DELETED: &str = "order.deleted";

/// An exchange offer was created.
pub const EXCHANGE_CREATED: &str = "exchange.created";

/// An exchange offer was accepted by its counterparty.
pub const EXCHANGE_ACCEPTED: &str = "exchange.accepted";

/// An exchange offer was declined.
pub const EXCHANGE_DECLINED: &str = "exchange.declined";

/// Legacy name for [`EXCHANGE_CREATED`].
///
/// Nothing publishes here any more. The notification service still listens so
/// that older publishers keep producing notifications; payloads are decoded as
/// [`crate::payloads::OfferCreated`].
pub const EXCHANGE_OFFERED: &str = "exchange.offered";

/// A book was assigned to a user's library.
pub const LIBRARY_BOOK_ASSIGNED: &str = "userlibrary.book.assigned";

/// A book was removed from a user's library.
pub const LIBRARY_BOOK_UNASSIGNED: &str = "userlibrary.book.unassigned";

/// A library entry was deleted by id.
pub const LIBRARY_ENTRY_DELETED: &str = "userlibrary.entry.deleted";

/// A library entry was rewritten.
pub const LIBRARY_ENTRY_UPDATED: &str = "userlibrary.entry.updated";

/// Every subject on the bus, in a stable order.
pub const ALL: &[&str] = &[
    USER_CREATED,
    BOOK_CREATED,
    ORDERS_CREATED,
    ORDER_COMPLETED,
    ORDER_DELETED,
    EXCHANGE_CREATED,
    EXCHANGE_ACCEPTED,
    EXCHANGE_DECLINED,
    EXCHANGE_OFFERED,
    LIBRARY_BOOK_ASSIGNED,
    LIBRARY_BOOK_UNASSIGNED,
    LIBRARY_ENTRY_DELETED,
    LIBRARY_ENTRY_UPDATED,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn subjects_are_unique() {
        let unique: HashSet<_> = ALL.iter().collect();
        assert_eq!(unique.len(), ALL.len());
    }

    #[test]
    fn subjects_are_dot_separated_lowercase() {
        for subject in ALL {
            assert!(subject.contains('.'), "{subject} has no namespace");
            assert!(
                subject.chars().all(|c| c.is_ascii_lowercase() || c == '.'),
                "{subject} is not lowercase"
            );
        }
    }
}
