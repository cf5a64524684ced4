//! Endpoints shared by every binary.

pub mod health;

pub use health::{health_check, health_router, metrics_router};
