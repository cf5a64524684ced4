//! # Book Exchange Runtime
//!
//! Runtime components shared by the Book Exchange binaries:
//!
//! - **[`consumer`]**: subscribe/process/reconnect loop over an [`EventBus`](book_exchange_core::event_bus::EventBus)
//! - **[`handler`]**: the [`EventHandler`] trait consumers dispatch to
//! - **[`shutdown`]**: termination signal and bounded draining of background tasks
//! - **[`metrics`]**: metric descriptions and the Prometheus recorder
//!
//! # Example
//!
//! ```rust,ignore
//! use book_exchange_runtime::{EventConsumer, shutdown};
//! use book_exchange_core::subjects;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//!
//! let consumer = EventConsumer::builder()
//!     .name("notifications")
//!     .subjects(subjects::ALL.iter().map(ToString::to_string).collect())
//!     .event_bus(event_bus)
//!     .handler(orchestrator)
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! shutdown::shutdown_signal().await;
//! let _ = shutdown_tx.send(());
//! shutdown::await_tasks(vec![handle], shutdown_timeout).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod handler;
pub mod metrics;
pub mod shutdown;

pub use consumer::{ConsumerError, EventConsumer, EventConsumerBuilder};
pub use handler::{EventHandler, HandlerError};
