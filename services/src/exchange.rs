//! Peer-to-peer exchange offers.
//!
//! An offer is made by its owner to a counterparty: the owner gives the
//! offered books and receives the requested ones. It starts `PENDING` and
//! leaves that state exactly once, to `ACCEPTED` or `DECLINED`.
//!
//! Accepting settles the swap through the library before the status changes:
//!
//! ```text
//! unassign offered   (owner)          ┐
//! unassign requested (counterparty)   │ any failure: undo the completed
//! assign offered     → counterparty   │ steps in reverse, offer stays
//! assign requested   → owner          ┘ PENDING
//! PENDING → ACCEPTED (guarded)          lost race: undo all steps, Conflict
//! ```

use crate::guarded::{Versioned, guarded_write, write_if_unchanged};
use crate::library_client::LibraryClient;
use crate::ServiceEnvironment;
use book_exchange_core::cache::ttl;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::environment::{Clock, rfc3339_micros, truncate_micros};
use book_exchange_core::payloads::{OfferAccepted, OfferCreated, OfferDeclined};
use book_exchange_core::query::{Filter, Query, Update};
use book_exchange_core::repository::{CachedRepository, Entity, ListKey};
use book_exchange_core::store::CollectionSpec;
use book_exchange_core::{DateTime, Error, ObjectId, Result, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where an offer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    /// Waiting for the counterparty.
    Pending,
    /// Accepted and settled.
    Accepted,
    /// Declined.
    Declined,
}

impl OfferStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "DECLINED" => Ok(Self::Declined),
            _ => Err(Error::InvalidArgument(format!("unknown offer status {s:?}"))),
        }
    }
}

/// An exchange offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOffer {
    /// Id.
    pub id: ObjectId,
    /// User making the offer.
    pub owner_id: ObjectId,
    /// User the offer is addressed to.
    pub counterparty_id: ObjectId,
    /// Books the owner gives, in order.
    #[serde(default)]
    pub offered_book_ids: Vec<ObjectId>,
    /// Books the owner asks for, in order.
    #[serde(default)]
    pub requested_book_ids: Vec<ObjectId>,
    /// Lifecycle state.
    pub status: OfferStatus,
    /// Creation time.
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
    /// Time of the last write.
    #[serde(with = "rfc3339_micros")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ExchangeOffer {
    const FAMILY: &'static str = "offer";
    const COLLECTION: CollectionSpec = CollectionSpec::new("exchange_offers");

    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Versioned for ExchangeOffer {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Fields of a new offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOffer {
    /// User making the offer.
    pub owner_id: ObjectId,
    /// User the offer is addressed to.
    pub counterparty_id: ObjectId,
    /// Books the owner gives.
    #[serde(default)]
    pub offered_book_ids: Vec<ObjectId>,
    /// Books the owner asks for.
    #[serde(default)]
    pub requested_book_ids: Vec<ObjectId>,
}

#[derive(Serialize)]
struct StoredOffer<'a> {
    #[serde(flatten)]
    offer: &'a NewOffer,
    status: OfferStatus,
    #[serde(with = "rfc3339_micros")]
    created_at: DateTime<Utc>,
    #[serde(with = "rfc3339_micros")]
    updated_at: DateTime<Utc>,
}

const LISTS: &str = "exchange:offers";

/// List keys.
pub mod keys {
    use super::{LISTS, ListKey, ObjectId, OfferStatus, ttl};

    /// Every offer.
    #[must_use]
    pub fn all() -> ListKey {
        ListKey::new(LISTS, "all", ttl::VOLATILE_LIST)
    }

    /// Pending offers.
    #[must_use]
    pub fn pending() -> ListKey {
        ListKey::new(LISTS, "pending", ttl::VOLATILE_LIST)
    }

    /// Offers a user owns or is the counterparty of.
    #[must_use]
    pub fn user(user: &ObjectId) -> ListKey {
        ListKey::new(LISTS, format!("user:{user}"), ttl::FILTER_LIST)
    }

    /// Offers in one status.
    #[must_use]
    pub fn status(status: OfferStatus) -> ListKey {
        ListKey::new(LISTS, format!("status:{status}"), ttl::FILTER_LIST)
    }
}

fn affected_keys(offer: &ExchangeOffer) -> Vec<String> {
    vec![
        keys::all().key,
        keys::pending().key,
        keys::user(&offer.owner_id).key,
        keys::user(&offer.counterparty_id).key,
        keys::status(offer.status).key,
    ]
}

fn ensure_pending(offer: &ExchangeOffer) -> Result<()> {
    if offer.status == OfferStatus::Pending {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "offer {} is already {}",
            offer.id, offer.status
        )))
    }
}

/// One library call of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Unassign { user: ObjectId, book: ObjectId },
    Assign { user: ObjectId, book: ObjectId },
}

impl Move {
    async fn run(self, library: &dyn LibraryClient) -> Result<()> {
        match self {
            Self::Unassign { user, book } => library.unassign(&user, &book).await,
            Self::Assign { user, book } => library.assign(&user, &book).await,
        }
    }

    const fn inverse(self) -> Self {
        match self {
            Self::Unassign { user, book } => Self::Assign { user, book },
            Self::Assign { user, book } => Self::Unassign { user, book },
        }
    }
}

/// The library moves that swap an offer's books, in execution order.
fn settlement_plan(offer: &ExchangeOffer) -> Vec<Move> {
    let owner = offer.owner_id;
    let counterparty = offer.counterparty_id;

    let mut plan = Vec::new();
    plan.extend(offer.offered_book_ids.iter().map(|&book| Move::Unassign { user: owner, book }));
    plan.extend(
        offer
            .requested_book_ids
            .iter()
            .map(|&book| Move::Unassign { user: counterparty, book }),
    );
    plan.extend(
        offer
            .offered_book_ids
            .iter()
            .map(|&book| Move::Assign { user: counterparty, book }),
    );
    plan.extend(offer.requested_book_ids.iter().map(|&book| Move::Assign { user: owner, book }));
    plan
}

/// Exchange use cases.
#[derive(Clone)]
pub struct ExchangeService {
    offers: CachedRepository<ExchangeOffer>,
    emitter: EventEmitter,
    clock: Arc<dyn Clock>,
    library: Arc<dyn LibraryClient>,
}

impl ExchangeService {
    /// Create the service; `library` performs settlements.
    #[must_use]
    pub fn new(env: &ServiceEnvironment, library: Arc<dyn LibraryClient>) -> Self {
        Self {
            offers: env.repository(),
            emitter: env.emitter.clone(),
            clock: Arc::clone(&env.clock),
            library,
        }
    }

    /// Make an offer and publish `exchange.created`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if owner and counterparty are the same user
    ///   or the offer moves no books
    /// - [`Error::StoreUnavailable`] if the store write failed
    pub async fn create_offer(&self, offer: NewOffer) -> Result<ExchangeOffer> {
        if offer.owner_id == offer.counterparty_id {
            return Err(Error::InvalidArgument(
                "an offer needs two different users".to_string(),
            ));
        }
        if offer.offered_book_ids.is_empty() && offer.requested_book_ids.is_empty() {
            return Err(Error::InvalidArgument("an offer must move at least one book".to_string()));
        }

        let now = truncate_micros(self.clock.now());
        let stored = StoredOffer {
            offer: &offer,
            status: OfferStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let created = self.offers.insert(&stored, affected_keys).await?;
        tracing::info!(
            offer_id = %created.id,
            owner_id = %created.owner_id,
            counterparty_id = %created.counterparty_id,
            "Exchange offer created"
        );

        self.emitter
            .emit(&OfferCreated {
                offer_id: created.id.to_hex(),
                owner_id: Some(created.owner_id.to_hex()),
                counterparty_id: Some(created.counterparty_id.to_hex()),
            })
            .await;
        Ok(created)
    }

    /// One offer.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::StoreUnavailable`] if the store read failed
    pub async fn get_offer(&self, id: &ObjectId) -> Result<ExchangeOffer> {
        self.offers.get(id).await
    }

    /// Accept an offer on behalf of its counterparty, settle the swap and
    /// publish `exchange.accepted`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::InvalidArgument`] if `requester` is not the counterparty
    /// - [`Error::Conflict`] if the offer is not pending, a user no longer
    ///   holds a book being swapped, or another write won the race
    /// - [`Error::DownstreamUnavailable`] if the library could not be reached;
    ///   the offer stays pending and completed moves are undone
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn accept_offer(&self, id: &ObjectId, requester: &ObjectId) -> Result<ExchangeOffer> {
        let offer = self.offers.get_uncached(id).await?;
        ensure_pending(&offer)?;
        if offer.counterparty_id != *requester {
            return Err(Error::InvalidArgument(format!(
                "only the counterparty can accept offer {id}"
            )));
        }

        let plan = settlement_plan(&offer);
        self.settle(&offer, &plan).await?;

        let update = Update::new().set("status", OfferStatus::Accepted);
        let accepted =
            match write_if_unchanged(&self.offers, self.clock.as_ref(), &offer, update, affected_keys).await {
                Ok(Some(accepted)) => accepted,
                Ok(None) => {
                    self.undo(&offer, &plan).await;
                    return Err(Error::Conflict(format!("offer {id} changed while being accepted")));
                }
                Err(e) => {
                    self.undo(&offer, &plan).await;
                    return Err(e);
                }
            };
        tracing::info!(offer_id = %id, requester_id = %requester, moves = plan.len(), "Exchange offer accepted");

        self.emitter
            .emit(&OfferAccepted {
                offer_id: accepted.id.to_hex(),
                owner_id: accepted.owner_id.to_hex(),
                requester_id: requester.to_hex(),
            })
            .await;
        Ok(accepted)
    }

    /// Decline a pending offer and publish `exchange.declined`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::Conflict`] if the offer is not pending
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn decline_offer(&self, id: &ObjectId) -> Result<ExchangeOffer> {
        let declined = guarded_write(
            &self.offers,
            self.clock.as_ref(),
            id,
            ensure_pending,
            |_| Update::new().set("status", OfferStatus::Declined),
            affected_keys,
        )
        .await?;
        tracing::info!(offer_id = %id, "Exchange offer declined");

        self.emitter
            .emit(&OfferDeclined {
                offer_id: declined.id.to_hex(),
                owner_id: declined.owner_id.to_hex(),
            })
            .await;
        Ok(declined)
    }

    /// Delete an offer in any state.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn delete_offer(&self, id: &ObjectId) -> Result<ExchangeOffer> {
        let deleted = self.offers.delete(id, affected_keys).await?;
        tracing::info!(offer_id = %id, "Exchange offer deleted");
        Ok(deleted)
    }

    /// Replace both book lists of a pending offer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if both lists are empty
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::Conflict`] if the offer is not pending
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn update_offer(
        &self,
        id: &ObjectId,
        offered: Vec<ObjectId>,
        requested: Vec<ObjectId>,
    ) -> Result<ExchangeOffer> {
        if offered.is_empty() && requested.is_empty() {
            return Err(Error::InvalidArgument("an offer must move at least one book".to_string()));
        }
        guarded_write(
            &self.offers,
            self.clock.as_ref(),
            id,
            ensure_pending,
            |_| {
                Update::new()
                    .set("offered_book_ids", &offered)
                    .set("requested_book_ids", &requested)
            },
            affected_keys,
        )
        .await
    }

    /// Append a book to a pending offer's offered list.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::Conflict`] if the offer is not pending
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn add_offered_book(&self, id: &ObjectId, book: &ObjectId) -> Result<ExchangeOffer> {
        guarded_write(
            &self.offers,
            self.clock.as_ref(),
            id,
            ensure_pending,
            |_| Update::new().push("offered_book_ids", book),
            affected_keys,
        )
        .await
    }

    /// Remove a book from a pending offer's offered list.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such offer
    /// - [`Error::Conflict`] if the offer is not pending
    /// - [`Error::StoreUnavailable`] if the store failed
    pub async fn remove_offered_book(&self, id: &ObjectId, book: &ObjectId) -> Result<ExchangeOffer> {
        guarded_write(
            &self.offers,
            self.clock.as_ref(),
            id,
            ensure_pending,
            |_| Update::new().pull("offered_book_ids", book),
            affected_keys,
        )
        .await
    }

    /// Offers `user` owns or is the counterparty of.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_user(&self, user: &ObjectId) -> Result<Vec<ExchangeOffer>> {
        let filter = Filter::Or(vec![
            Filter::eq("owner_id", user),
            Filter::eq("counterparty_id", user),
        ]);
        self.offers.list(&keys::user(user), &Query::filter(filter)).await
    }

    /// Pending offers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_pending(&self) -> Result<Vec<ExchangeOffer>> {
        self.offers
            .list(
                &keys::pending(),
                &Query::filter(Filter::eq("status", OfferStatus::Pending)),
            )
            .await
    }

    /// Every offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_all(&self) -> Result<Vec<ExchangeOffer>> {
        self.offers.list(&keys::all(), &Query::all()).await
    }

    /// Offers in one status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the store read failed.
    pub async fn list_by_status(&self, status: OfferStatus) -> Result<Vec<ExchangeOffer>> {
        self.offers
            .list(&keys::status(status), &Query::filter(Filter::eq("status", status)))
            .await
    }

    /// Run `plan`; on failure undo the completed moves and surface the error.
    async fn settle(&self, offer: &ExchangeOffer, plan: &[Move]) -> Result<()> {
        for (done, step) in plan.iter().enumerate() {
            if let Err(e) = step.run(self.library.as_ref()).await {
                tracing::warn!(offer_id = %offer.id, step = ?step, error = %e, "Settlement step failed, compensating");
                self.undo(offer, &plan[..done]).await;
                return Err(match e {
                    Error::NotFound { .. } => Error::Conflict(format!(
                        "offer {} can no longer be settled: {e}",
                        offer.id
                    )),
                    other => other,
                });
            }
        }
        Ok(())
    }

    /// Reverse completed moves, newest first. Failures are logged and skipped.
    async fn undo(&self, offer: &ExchangeOffer, completed: &[Move]) {
        for step in completed.iter().rev() {
            let inverse = step.inverse();
            if let Err(e) = inverse.run(self.library.as_ref()).await {
                tracing::error!(offer_id = %offer.id, step = ?inverse, error = %e, "Compensation step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 12])
    }

    fn offer(offered: Vec<ObjectId>, requested: Vec<ObjectId>) -> ExchangeOffer {
        let now = Utc::now();
        ExchangeOffer {
            id: id(0),
            owner_id: id(1),
            counterparty_id: id(2),
            offered_book_ids: offered,
            requested_book_ids: requested,
            status: OfferStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn plan_unassigns_before_assigning_crosswise() {
        let plan = settlement_plan(&offer(vec![id(10)], vec![id(20)]));
        assert_eq!(
            plan,
            vec![
                Move::Unassign { user: id(1), book: id(10) },
                Move::Unassign { user: id(2), book: id(20) },
                Move::Assign { user: id(2), book: id(10) },
                Move::Assign { user: id(1), book: id(20) },
            ]
        );
    }

    #[test]
    fn inverse_swaps_direction() {
        let step = Move::Assign { user: id(1), book: id(9) };
        assert_eq!(step.inverse(), Move::Unassign { user: id(1), book: id(9) });
        assert_eq!(step.inverse().inverse(), step);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("declined".parse::<OfferStatus>().ok(), Some(OfferStatus::Declined));
        assert!("EXPIRED".parse::<OfferStatus>().is_err());
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(OfferStatus::Accepted).ok(),
            Some(serde_json::json!("ACCEPTED"))
        );
    }
}
