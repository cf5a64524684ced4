//! # Book Exchange Notifications
//!
//! Turns bus events into plain-text e-mails.
//!
//! - [`message`]: pure decoding and formatting ([`draft`](message::draft))
//! - [`NotificationOrchestrator`]: resolves recipients and hands messages to a sink;
//!   plugs into [`book_exchange_runtime::EventConsumer`] as its handler
//! - [`UserDirectory`] / [`EmailSink`]: the I/O seams
//! - [`SmtpEmailSink`] and [`LogEmailSink`]: production sinks
//!
//! # Example
//!
//! ```rust,ignore
//! use book_exchange_notifications::{LogEmailSink, NotificationOrchestrator};
//! use book_exchange_runtime::EventConsumer;
//! use book_exchange_core::subjects;
//!
//! let orchestrator = NotificationOrchestrator::new(directory, Arc::new(LogEmailSink::new()));
//! let consumer = EventConsumer::builder()
//!     .name("notifications")
//!     .subjects(subjects::ALL.iter().map(ToString::to_string).collect())
//!     .event_bus(bus)
//!     .handler(Arc::new(orchestrator))
//!     .shutdown(shutdown_rx)
//!     .build()?;
//! ```

pub mod directory;
pub mod message;
pub mod mocks;
pub mod orchestrator;
pub mod sink;
pub mod smtp;

pub use directory::{DirectoryFuture, UserDirectory};
pub use message::{DropReason, EmailMessage};
pub use orchestrator::{NotificationOrchestrator, Outcome};
pub use sink::{EmailSink, LogEmailSink, SinkError, SinkFuture};
pub use smtp::SmtpEmailSink;
