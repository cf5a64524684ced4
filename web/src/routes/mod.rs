//! One router per service.
//!
//! Each router carries its service as state and speaks JSON. Path ids are
//! 24-character hex strings; anything else is a 400 before the service is
//! called.

pub mod books;
pub mod exchange;
pub mod library;
pub mod orders;
pub mod users;

use crate::error::AppError;
use book_exchange_core::{Error, ObjectId};

/// Parse a path segment as an id.
pub(crate) fn parse_id(raw: &str) -> Result<ObjectId, AppError> {
    raw.parse::<ObjectId>()
        .map_err(|e| AppError::from(Error::from(e)))
}

pub use books::books_router;
pub use exchange::exchange_router;
pub use library::library_router;
pub use orders::orders_router;
pub use users::users_router;
