//! Turning an event into an e-mail draft.
//!
//! Everything here is pure: [`draft`] decodes the envelope, picks who the
//! message is for and renders the text. Resolving a user id to an address
//! and handing the message to a sink happen in the orchestrator.

use book_exchange_core::ObjectId;
use book_exchange_core::event::{DomainEvent, SerializedEvent};
use book_exchange_core::payloads::{
    BookAssigned, BookCreated, BookUnassigned, EntryDeleted, EntryUpdated, OfferAccepted,
    OfferCreated, OfferDeclined, OrderCompleted, OrderCreated, OrderDeleted, UserCreated,
};
use book_exchange_core::subjects;
use thiserror::Error;

/// Who a draft is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A literal address carried by the event.
    Address(String),
    /// A user whose address must be looked up.
    User(ObjectId),
}

/// An e-mail waiting for its recipient to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Who the message is for.
    pub recipient: Recipient,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Draft {
    /// Address the draft to `to`.
    #[must_use]
    pub fn addressed_to(self, to: String) -> EmailMessage {
        EmailMessage {
            to,
            subject: self.subject,
            body: self.body,
        }
    }
}

/// A plain-text e-mail ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Why an event did not become an e-mail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No message is defined for the subject.
    #[error("no notification for subject {0}")]
    UnknownSubject(String),

    /// The payload did not decode, or carried an unusable id.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The event names nobody to notify.
    #[error("event has no recipient")]
    NoRecipient,

    /// The recipient's address could not be resolved.
    #[error("recipient lookup failed: {0}")]
    LookupFailed(String),

    /// The sink refused the message.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

impl DropReason {
    /// Short label used for the `reason` metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UnknownSubject(_) => "unknown_subject",
            Self::Malformed(_) => "malformed",
            Self::NoRecipient => "no_recipient",
            Self::LookupFailed(_) => "lookup_failed",
            Self::DeliveryFailed(_) => "delivery_failed",
        }
    }
}

fn decode<E: DomainEvent>(event: &SerializedEvent) -> Result<E, DropReason> {
    E::from_bytes(&event.data).map_err(|e| DropReason::Malformed(e.to_string()))
}

fn user(id: &str) -> Result<Recipient, DropReason> {
    id.parse()
        .map(Recipient::User)
        .map_err(|e| DropReason::Malformed(format!("{e}")))
}

fn to_user(id: &str, subject: &str, body: String) -> Result<Draft, DropReason> {
    Ok(Draft {
        recipient: user(id)?,
        subject: subject.to_string(),
        body,
    })
}

/// Decode `event` and render the message it should produce.
///
/// # Errors
///
/// - [`DropReason::UnknownSubject`] for subjects nobody is notified about
/// - [`DropReason::Malformed`] if the payload or a user id does not parse
/// - [`DropReason::NoRecipient`] for events that name no user
pub fn draft(event: &SerializedEvent) -> Result<Draft, DropReason> {
    match event.event_type.as_str() {
        subjects::USER_CREATED => {
            let e: UserCreated = decode(event)?;
            Ok(Draft {
                recipient: Recipient::Address(e.email),
                subject: "Welcome to Book Exchange".to_string(),
                body: format!("Hi {}, your account {} is ready.", e.name, e.id),
            })
        }
        subjects::BOOK_CREATED => {
            decode::<BookCreated>(event)?;
            Err(DropReason::NoRecipient)
        }
        subjects::ORDERS_CREATED => {
            let e: OrderCreated = decode(event)?;
            to_user(
                &e.user_id,
                "Order confirmation",
                format!(
                    "Thanks for your order {} ({} books).",
                    e.order_id,
                    e.book_ids.len()
                ),
            )
        }
        subjects::ORDER_COMPLETED => {
            let e: OrderCompleted = decode(event)?;
            to_user(
                &e.user_id,
                "Order returned",
                format!("Your order {} has been returned.", e.order_id),
            )
        }
        subjects::ORDER_DELETED => {
            let e: OrderDeleted = decode(event)?;
            to_user(
                &e.user_id,
                "Order deleted",
                format!("Your order {} has been deleted.", e.order_id),
            )
        }
        subjects::EXCHANGE_CREATED | subjects::EXCHANGE_OFFERED => {
            let e: OfferCreated = decode(event)?;
            let owner = e.owner_id.ok_or(DropReason::NoRecipient)?;
            to_user(
                &owner,
                "Exchange offer created",
                format!("Your exchange offer {} has been created.", e.offer_id),
            )
        }
        subjects::EXCHANGE_ACCEPTED => {
            let e: OfferAccepted = decode(event)?;
            to_user(
                &e.owner_id,
                "Exchange offer accepted",
                format!(
                    "Your exchange offer {} was accepted by {}.",
                    e.offer_id, e.requester_id
                ),
            )
        }
        subjects::EXCHANGE_DECLINED => {
            let e: OfferDeclined = decode(event)?;
            to_user(
                &e.owner_id,
                "Exchange offer declined",
                format!("Your exchange offer {} was declined.", e.offer_id),
            )
        }
        subjects::LIBRARY_BOOK_ASSIGNED => {
            let e: BookAssigned = decode(event)?;
            to_user(
                &e.user_id,
                "Book assigned",
                format!("The book {} has been assigned to you.", e.book_id),
            )
        }
        subjects::LIBRARY_BOOK_UNASSIGNED => {
            let e: BookUnassigned = decode(event)?;
            to_user(
                &e.user_id,
                "Book unassigned",
                format!("The book {} has been removed from your library.", e.book_id),
            )
        }
        subjects::LIBRARY_ENTRY_DELETED => {
            let e: EntryDeleted = decode(event)?;
            to_user(
                &e.user_id,
                "Library entry deleted",
                format!("Your library entry {} was deleted.", e.id),
            )
        }
        subjects::LIBRARY_ENTRY_UPDATED => {
            let e: EntryUpdated = decode(event)?;
            to_user(
                &e.user_id,
                "Library entry updated",
                format!(
                    "Your library entry {} was updated (new book {}).",
                    e.id, e.book_id
                ),
            )
        }
        other => Err(DropReason::UnknownSubject(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";

    fn envelope(subject: &str, payload: &serde_json::Value) -> SerializedEvent {
        SerializedEvent::new(
            subject.to_string(),
            serde_json::to_vec(payload).unwrap_or_default(),
            None,
        )
    }

    fn user_id() -> ObjectId {
        USER.parse().unwrap_or_default()
    }

    #[test]
    fn welcome_goes_to_the_address_in_the_event() {
        let event = envelope(
            subjects::USER_CREATED,
            &serde_json::json!({ "id": USER, "name": "Ada", "email": "ada@example.org" }),
        );

        let draft = draft(&event);

        assert_eq!(
            draft,
            Ok(Draft {
                recipient: Recipient::Address("ada@example.org".to_string()),
                subject: "Welcome to Book Exchange".to_string(),
                body: format!("Hi Ada, your account {USER} is ready."),
            })
        );
    }

    #[test]
    fn order_confirmation_counts_books() {
        let event = envelope(
            subjects::ORDERS_CREATED,
            &serde_json::json!({ "order_id": "o1", "user_id": USER, "book_ids": ["b1", "b2"] }),
        );

        let draft = draft(&event);

        assert_eq!(
            draft.map(|d| (d.recipient, d.body)),
            Ok((
                Recipient::User(user_id()),
                "Thanks for your order o1 (2 books).".to_string()
            ))
        );
    }

    #[test]
    fn legacy_offered_subject_renders_like_created() {
        let payload = serde_json::json!({ "offer_id": "x1", "owner_id": USER });
        let created = draft(&envelope(subjects::EXCHANGE_CREATED, &payload));
        let offered = draft(&envelope(subjects::EXCHANGE_OFFERED, &payload));

        assert!(created.is_ok());
        assert_eq!(created, offered);
    }

    #[test]
    fn offer_without_owner_has_no_recipient() {
        let event = envelope(subjects::EXCHANGE_CREATED, &serde_json::json!({ "offer_id": "x1" }));
        assert_eq!(draft(&event), Err(DropReason::NoRecipient));
    }

    #[test]
    fn book_created_has_no_recipient() {
        let event = envelope(
            subjects::BOOK_CREATED,
            &serde_json::json!({ "id": USER, "title": "Dune", "author": "Frank Herbert" }),
        );
        assert_eq!(draft(&event), Err(DropReason::NoRecipient));
    }

    #[test]
    fn entry_update_mentions_the_new_book() {
        let event = envelope(
            subjects::LIBRARY_ENTRY_UPDATED,
            &serde_json::json!({ "id": "e1", "user_id": USER, "book_id": "b2" }),
        );
        let body = draft(&event).map(|d| d.body).unwrap_or_default();
        assert!(body.contains("b2"), "{body}");
        assert!(body.contains("e1"), "{body}");
    }

    #[test]
    fn unusable_user_id_is_malformed() {
        let event = envelope(
            subjects::ORDER_DELETED,
            &serde_json::json!({ "order_id": "o1", "user_id": "u1", "book_ids": [] }),
        );
        assert!(matches!(draft(&event), Err(DropReason::Malformed(_))));
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let event = SerializedEvent::new(subjects::ORDER_COMPLETED.to_string(), b"{".to_vec(), None);
        assert!(matches!(draft(&event), Err(DropReason::Malformed(_))));
    }

    #[test]
    fn unknown_subject_is_reported() {
        let event = envelope("inventory.restocked", &serde_json::json!({}));
        assert_eq!(
            draft(&event),
            Err(DropReason::UnknownSubject("inventory.restocked".to_string()))
        );
    }

    #[test]
    fn every_bus_subject_has_a_message() {
        for subject in subjects::ALL {
            let event = envelope(subject, &serde_json::json!({}));
            let result = draft(&event);
            assert!(
                !matches!(result, Err(DropReason::UnknownSubject(_))),
                "{subject} has no message"
            );
        }
    }
}
