//! # Book Exchange Testing
//!
//! In-memory doubles for the seams of the coordination layer.
//!
//! This crate provides:
//! - [`InMemoryEventBus`] / [`FailingEventBus`]: subject-routed bus and a bus that is always down
//! - [`InMemoryCache`]: TTL cache with hit/miss counters and an outage switch
//! - [`InMemoryDocumentStore`]: JSON collections with unique fields and an outage switch
//! - Clocks for deterministic timestamps
//!
//! ## Example
//!
//! ```ignore
//! use book_exchange_testing::{InMemoryCache, InMemoryDocumentStore};
//! use book_exchange_core::repository::CachedRepository;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let cache = Arc::new(InMemoryCache::new());
//! let books: CachedRepository<Book> = CachedRepository::new(store, cache.clone());
//!
//! books.get(&id).await?;
//! assert_eq!(cache.stats().misses, 1);
//! ```

use book_exchange_core::environment::Clock;
use chrono::{DateTime, Utc};

mod cache;
mod event_bus;
mod store;

pub use cache::{CacheStats, InMemoryCache};
pub use event_bus::{FailingEventBus, InMemoryEventBus};
pub use store::InMemoryDocumentStore;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use book_exchange_testing::mocks::FixedClock;
    /// use book_exchange_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that replays a scripted sequence of instants.
    ///
    /// Once the script is exhausted the last instant repeats. Useful for
    /// clocks that stand still or step backwards between two writes.
    #[derive(Debug)]
    pub struct SteppingClock {
        times: Mutex<Vec<DateTime<Utc>>>,
        last: Mutex<Option<DateTime<Utc>>>,
    }

    impl SteppingClock {
        /// Create a clock returning `times` in order.
        #[must_use]
        pub fn new(times: Vec<DateTime<Utc>>) -> Self {
            let mut times = times;
            times.reverse();
            Self {
                times: Mutex::new(times),
                last: Mutex::new(None),
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            let mut last = self.last.lock().unwrap();
            let next = self.times.lock().unwrap().pop().or(*last).unwrap_or_else(Utc::now);
            *last = Some(next);
            next
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::time::Duration;

    /// Poll `condition` until it holds or `timeout` elapses.
    ///
    /// Returns whether the condition was eventually met. Detached cache work
    /// and bus delivery are asynchronous; tests use this instead of sleeping
    /// for a fixed time.
    pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{SteppingClock, test_clock};
    use super::*;
    use book_exchange_core::environment::next_update_time;
    use chrono::Duration;

    #[test]
    fn test_clock_is_deterministic() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn stepping_clock_replays_then_repeats() {
        let t0 = test_clock().now();
        let clock = SteppingClock::new(vec![t0, t0 - Duration::seconds(5)]);
        assert_eq!(clock.now(), t0);
        assert_eq!(clock.now(), t0 - Duration::seconds(5));
        assert_eq!(clock.now(), t0 - Duration::seconds(5));
    }

    #[test]
    fn backwards_clock_still_yields_increasing_update_times() {
        let t0 = test_clock().now();
        let clock = SteppingClock::new(vec![t0 - Duration::minutes(1)]);
        assert!(next_update_time(&clock, t0) > t0);
    }

    #[tokio::test]
    async fn eventually_reports_timeout() {
        let met = helpers::eventually(std::time::Duration::from_millis(20), || false).await;
        assert!(!met);
    }
}
