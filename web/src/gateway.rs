//! Edge router.
//!
//! `/<service>/<tail>` is forwarded to the backend registered for
//! `<service>` as `<backend>/<tail>`, keeping the method, query string,
//! headers and body. The backend's status, headers and body come back
//! unchanged.
//!
//! | Outcome | Status |
//! |---|---|
//! | unknown service | 404 |
//! | backend unreachable | 502 |
//! | body over [`MAX_BODY_BYTES`] | 400 |

use crate::error::AppError;
use axum::{
    Router,
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::any,
};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Largest request body the gateway buffers.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Ways a forwarded call can fail.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No backend registered under this name.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The request body could not be read.
    #[error("unreadable request body: {0}")]
    Body(String),

    /// The backend did not answer.
    #[error("{service} unreachable: {source}")]
    Unreachable {
        /// Service name.
        service: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownService(_) => Self::not_found(err.to_string()),
            GatewayError::Body(_) => Self::bad_request(err.to_string()),
            GatewayError::Unreachable { .. } => {
                Self::bad_gateway(err.to_string()).with_source(anyhow::Error::new(err))
            }
        }
    }
}

#[derive(Clone)]
struct Gateway {
    backends: Arc<HashMap<String, String>>,
    client: Client,
}

// Connection-scoped headers are not forwarded in either direction.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::HOST,
        header::TRANSFER_ENCODING,
        header::TE,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
}

/// Build the edge router over `backends` (service name to base URL).
pub fn gateway_router(backends: HashMap<String, String>, client: Client) -> Router {
    let backends = backends
        .into_iter()
        .map(|(name, url)| (name, url.trim_end_matches('/').to_string()))
        .collect();
    let gateway = Gateway {
        backends: Arc::new(backends),
        client,
    };
    Router::new()
        .route("/:service", any(forward_root))
        .route("/:service/*tail", any(forward))
        .with_state(gateway)
}

async fn forward_root(
    State(gateway): State<Gateway>,
    Path(service): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    Ok(gateway.forward(&service, "", request).await?)
}

async fn forward(
    State(gateway): State<Gateway>,
    Path((service, tail)): Path<(String, String)>,
    request: Request,
) -> Result<Response, AppError> {
    Ok(gateway.forward(&service, &tail, request).await?)
}

impl Gateway {
    async fn forward(
        &self,
        service: &str,
        tail: &str,
        request: Request,
    ) -> Result<Response, GatewayError> {
        let backend = self
            .backends
            .get(service)
            .ok_or_else(|| GatewayError::UnknownService(service.to_string()))?;

        let mut url = format!("{backend}/{}", tail.trim_start_matches('/'));
        if let Some(query) = request.uri().query() {
            url.push('?');
            url.push_str(query);
        }

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GatewayError::Body(e.to_string()))?;
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        tracing::debug!(service = %service, method = %parts.method, url = %url, "Forwarding");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| GatewayError::Unreachable {
                service: service.to_string(),
                source,
            })?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        let bytes = upstream
            .bytes()
            .await
            .map_err(|source| GatewayError::Unreachable {
                service: service.to_string(),
                source,
            })?;

        let mut response = (status, Body::from(bytes)).into_response();
        response.headers_mut().extend(headers);
        Ok(response)
    }
}
