//! # Book Exchange Web
//!
//! The HTTP shell around the services.
//!
//! ```text
//!   client ──▶ gateway ──▶ books | users | libraries | exchange | orders
//!                              │
//!                              └─▶ CachedRepository ─▶ store / cache / bus
//! ```
//!
//! - [`routes`]: one axum router per service, JSON in and out
//! - [`AppError`]: error kinds to HTTP status
//! - [`clients`]: reqwest implementations of the cross-service seams
//! - [`gateway`]: the edge router
//! - [`middleware`]: request id propagation
//! - [`handlers`]: `/health` and `/metrics`
//!
//! # Example
//!
//! ```ignore
//! use book_exchange_web::{health_router, middleware::request_id_layer, routes::orders_router};
//!
//! let app = orders_router(OrdersService::new(&env))
//!     .merge(health_router())
//!     .layer(request_id_layer());
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clients;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use clients::{HttpLibraryClient, HttpUserDirectory};
pub use error::{AppError, ErrorResponse};
pub use gateway::{GatewayError, gateway_router};
pub use handlers::{health_check, health_router, metrics_router};
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
