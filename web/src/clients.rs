//! HTTP clients for the services other processes depend on.
//!
//! - [`HttpUserDirectory`]: the accounts lookup the notifications worker uses
//! - [`HttpLibraryClient`]: the library calls exchange settlement makes
//!
//! Both map the callee's status back to an error kind: 404 is `NotFound`,
//! 400 is `InvalidArgument`, 409 is `Conflict`, anything else (or no
//! answer at all) is `DownstreamUnavailable`.

use book_exchange_core::{Error, ObjectId, Result};
use book_exchange_notifications::{DirectoryFuture, UserDirectory};
use book_exchange_services::LibraryClient;
use book_exchange_services::library_client::LibraryFuture;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Per-request timeout for downstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

async fn check(response: Response, entity: &'static str, id: &ObjectId) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => Error::not_found(entity, id),
        StatusCode::BAD_REQUEST => Error::InvalidArgument(body),
        StatusCode::CONFLICT => Error::Conflict(body),
        status => Error::DownstreamUnavailable(format!("{entity} service answered {status}: {body}")),
    })
}

fn unreachable(service: &str, err: &reqwest::Error) -> Error {
    Error::DownstreamUnavailable(format!("{service} unreachable: {err}"))
}

#[derive(Deserialize)]
struct Account {
    email: String,
}

/// Resolves users' addresses through the accounts service.
#[derive(Clone, Debug)]
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    /// Directory against the accounts service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with an explicit request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base(base_url),
        }
    }

    async fn lookup(&self, user: &ObjectId) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/users/{user}", self.base_url))
            .send()
            .await
            .map_err(|e| unreachable("accounts", &e))?;

        let account: Account = check(response, "user", user)
            .await?
            .json()
            .await
            .map_err(|e| Error::DownstreamUnavailable(format!("unreadable account: {e}")))?;
        Ok(account.email)
    }
}

impl UserDirectory for HttpUserDirectory {
    fn email_of<'a>(&'a self, user: &'a ObjectId) -> DirectoryFuture<'a> {
        Box::pin(self.lookup(user))
    }
}

/// Assigns and unassigns books through the library service.
#[derive(Clone, Debug)]
pub struct HttpLibraryClient {
    client: Client,
    base_url: String,
}

impl HttpLibraryClient {
    /// Client against the library service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with an explicit request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base(base_url),
        }
    }

    fn url(&self, user: &ObjectId, book: &ObjectId) -> String {
        format!("{}/users/{user}/books/{book}", self.base_url)
    }
}

impl LibraryClient for HttpLibraryClient {
    fn assign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url(user, book))
                .send()
                .await
                .map_err(|e| unreachable("library", &e))?;
            check(response, "user", user).await?;
            Ok(())
        })
    }

    fn unassign<'a>(&'a self, user: &'a ObjectId, book: &'a ObjectId) -> LibraryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .delete(self.url(user, book))
                .send()
                .await
                .map_err(|e| unreachable("library", &e))?;
            check(response, "book", book).await?;
            Ok(())
        })
    }
}
