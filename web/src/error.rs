//! Error types for web handlers.
//!
//! [`AppError`] is what every handler returns on failure. Service errors
//! convert into it with `?`, picking the status code from the error kind:
//!
//! | Kind | Status |
//! |---|---|
//! | `InvalidArgument` | 400 |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `StoreUnavailable` | 503 |
//! | `DownstreamUnavailable` | 502 |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use book_exchange_core::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn get_book(
///     State(catalogue): State<CatalogueService>,
///     Path(id): Path<String>,
/// ) -> Result<Json<Book>, AppError> {
///     Ok(Json(catalogue.get_book(&parse_id(&id)?).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for the log.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "INVALID_ARGUMENT".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            message.into(),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// Create a 502 Bad Gateway error.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            message.into(),
            "DOWNSTREAM_UNAVAILABLE".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "STORE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error code (for client error handling).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let status = match &err {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::DownstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        };
        let app = Self::new(status, message, err.kind().to_string());
        if status.is_server_error() {
            app.with_source(anyhow::Error::new(err))
        } else {
            app
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
        .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[INVALID_ARGUMENT] Invalid input");
    }

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (Error::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (Error::not_found("book", "1"), StatusCode::NOT_FOUND),
            (Error::Conflict("x".into()), StatusCode::CONFLICT),
            (Error::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::DownstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), kind);
        }
    }

    #[test]
    fn server_errors_keep_their_source() {
        let app = AppError::from(Error::StoreUnavailable("pool closed".into()));
        assert!(std::error::Error::source(&app).is_some());
    }

    #[test]
    fn not_found_message_names_entity() {
        let app = AppError::from(Error::not_found("order", "abc"));
        assert_eq!(app.to_string(), "[NOT_FOUND] order abc not found");
    }
}
