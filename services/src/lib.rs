//! # Book Exchange Services
//!
//! The five use-case services, each on top of one or more
//! [`CachedRepository`] instances:
//!
//! - [`catalogue`]: books, filtered and ranked lists, search
//! - [`accounts`]: users with unique e-mail
//! - [`library`]: which user holds which book
//! - [`exchange`]: peer-to-peer exchange offers and their settlement
//! - [`orders`]: orders and their lifecycle
//!
//! Every write follows the same sequence: store commit, cache invalidation,
//! then a best-effort event on the bus.
//!
//! ```text
//! service.create_order(..)
//!     │
//!     ├─▶ repository.insert      store commit, keys invalidated
//!     └─▶ emitter.emit           orders.created (failure only logged)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod catalogue;
pub mod exchange;
mod guarded;
pub mod library;
pub mod library_client;
pub mod mocks;
pub mod orders;

pub use accounts::AccountsService;
pub use catalogue::CatalogueService;
pub use exchange::ExchangeService;
pub use library::LibraryService;
pub use library_client::LibraryClient;
pub use orders::OrdersService;

use book_exchange_core::cache::Cache;
use book_exchange_core::detached::Detached;
use book_exchange_core::emitter::EventEmitter;
use book_exchange_core::environment::{Clock, SystemClock};
use book_exchange_core::event_bus::EventBus;
use book_exchange_core::repository::{CachedRepository, Entity};
use book_exchange_core::store::DocumentStore;
use std::sync::Arc;

/// Long-lived clients shared by a service process.
///
/// Built once at startup and cloned into every service.
#[derive(Clone)]
pub struct ServiceEnvironment {
    /// Authoritative store.
    pub store: Arc<dyn DocumentStore>,
    /// Shared cache.
    pub cache: Arc<dyn Cache>,
    /// Post-commit event publisher.
    pub emitter: EventEmitter,
    /// Source of `created_at` / `updated_at`.
    pub clock: Arc<dyn Clock>,
    /// Bound for detached cache work.
    pub detached: Detached,
}

impl ServiceEnvironment {
    /// Environment with the system clock and default detached timeout.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn Cache>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            cache,
            emitter: EventEmitter::new(bus),
            clock: Arc::new(SystemClock),
            detached: Detached::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the detached-task bound.
    #[must_use]
    pub const fn with_detached(mut self, detached: Detached) -> Self {
        self.detached = detached;
        self
    }

    /// A repository for `T` over this environment's store and cache.
    #[must_use]
    pub fn repository<T: Entity>(&self) -> CachedRepository<T> {
        CachedRepository::new(Arc::clone(&self.store), Arc::clone(&self.cache)).with_detached(self.detached)
    }
}

/// Reject blank required text fields.
pub(crate) fn require(field: &'static str, value: &str) -> book_exchange_core::Result<()> {
    if value.trim().is_empty() {
        Err(book_exchange_core::Error::InvalidArgument(format!("{field} is required")))
    } else {
        Ok(())
    }
}
