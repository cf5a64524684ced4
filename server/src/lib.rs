//! # Book Exchange Server
//!
//! Process wiring shared by the binaries in `src/bin`:
//!
//! | Binary | Serves |
//! |---|---|
//! | `books` | catalogue |
//! | `users` | accounts |
//! | `library` | user libraries |
//! | `exchange` | exchange offers (library over HTTP) |
//! | `orders` | orders |
//! | `notifications` | the notification consumer, plus `/health` and `/metrics` |
//! | `gateway` | the edge router |
//!
//! Every binary loads [`Config`] from the environment, installs tracing and
//! the Prometheus recorder, and stops on SIGINT/SIGTERM.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod telemetry;

pub use bootstrap::{BootstrapError, connect, serve};
pub use config::Config;
