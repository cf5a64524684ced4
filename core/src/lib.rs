//! # Book Exchange Core
//!
//! Contracts and the coordination layer shared by every Book Exchange service.
//!
//! This crate provides:
//!
//! - **Event bus**: subject-addressed publish/subscribe ([`event_bus`], [`subjects`], [`payloads`])
//! - **Cache-aside repository**: store + cache composition ([`repository`], [`store`], [`cache`])
//! - **Event emission**: post-commit, fire-and-forget ([`emitter`])
//! - **Errors**: the kinds a caller can observe ([`error`])
//!
//! ## Data flow
//!
//! ```text
//! write:  caller → repository → store (commit) → cache (invalidate) → emitter → bus
//! read:   caller → repository → cache (hit) | store (miss) → cache (populate, TTL)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use book_exchange_core::repository::CachedRepository;
//! use book_exchange_core::emitter::EventEmitter;
//!
//! let books: CachedRepository<Book> = CachedRepository::new(store, cache);
//! let book = books.insert(&draft, |b| vec![genre_list_key(&b.genre)]).await?;
//! emitter.emit(&BookCreated::from(&book)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod cache;
pub mod detached;
pub mod emitter;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod id;
pub mod payloads;
pub mod query;
pub mod repository;
pub mod store;
pub mod subjects;

pub use error::{Error, Result};
pub use id::ObjectId;

/// Environment traits - injected dependencies
pub mod environment {
    use chrono::{DateTime, Duration, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Timestamp for a write that follows one stamped `previous`.
    ///
    /// Always strictly later than `previous`, even if the clock stands still
    /// or steps backwards.
    #[must_use]
    pub fn next_update_time(clock: &dyn Clock, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = truncate_micros(clock.now());
        if now > previous {
            now
        } else {
            previous + Duration::microseconds(1)
        }
    }

    /// Drop sub-microsecond precision so timestamps survive a JSON round trip.
    #[must_use]
    pub fn truncate_micros(time: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(time.timestamp_micros()).unwrap_or(time)
    }

    /// Serde adapter writing RFC 3339 timestamps with exactly six fractional
    /// digits, so that string order equals time order.
    pub mod rfc3339_micros {
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        /// The stored form of `time`, for filters that compare timestamps.
        #[must_use]
        pub fn format(time: &DateTime<Utc>) -> String {
            time.to_rfc3339_opts(SecondsFormat::Micros, true)
        }

        /// Serialize.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format(time))
        }

        /// Deserialize.
        ///
        /// # Errors
        ///
        /// Fails on strings that are not RFC 3339.
        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
            let s = String::deserialize(deserializer)?;
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        struct Frozen(DateTime<Utc>);

        impl Clock for Frozen {
            fn now(&self) -> DateTime<Utc> {
                self.0
            }
        }

        #[test]
        fn next_update_time_is_strictly_increasing_on_frozen_clock() {
            let clock = Frozen(Utc::now());
            let first = next_update_time(&clock, clock.0 - Duration::seconds(1));
            let second = next_update_time(&clock, first);
            let third = next_update_time(&clock, second);
            assert!(first < second && second < third);
        }

        #[test]
        fn next_update_time_uses_clock_when_ahead() {
            let now = truncate_micros(Utc::now());
            let clock = Frozen(now);
            assert_eq!(next_update_time(&clock, now - Duration::hours(1)), now);
        }

        #[test]
        #[allow(clippy::expect_used)]
        fn micros_format_is_fixed_width() {
            #[derive(serde::Serialize)]
            struct Stamp(#[serde(with = "rfc3339_micros")] DateTime<Utc>);

            let t = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
            let json = serde_json::to_string(&Stamp(t)).expect("serialize");
            assert_eq!(json, "\"2023-11-14T22:13:20.000000Z\"");
        }
    }
}
