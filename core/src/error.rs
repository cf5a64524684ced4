//! Errors surfaced to callers of the repository and the services built on it.
//!
//! Only five kinds ever reach a caller. Cache and bus failures are absorbed
//! where they happen and only show up in logs and metrics.

use crate::id::InvalidId;
use crate::store::StoreError;
use thiserror::Error;

/// Result type for repository and service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the repository and the services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed id or missing required field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity is absent from the store.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity family (e.g. `"book"`).
        entity: &'static str,
        /// The id or selector that was looked up.
        id: String,
    },

    /// Unique-constraint violation or an illegal state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or failed the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A remote call to another service failed.
    #[error("Downstream unavailable: {0}")]
    DownstreamUnavailable(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::DownstreamUnavailable(_) => "DOWNSTREAM_UNAVAILABLE",
        }
    }
}

impl From<InvalidId> for Error {
    fn from(e: InvalidId) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::InvalidDocument(msg) => Self::InvalidArgument(msg),
            StoreError::Unavailable(msg) | StoreError::Serialization(msg) => {
                Self::StoreUnavailable(msg)
            }
        }
    }
}
