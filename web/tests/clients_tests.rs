//! reqwest clients and the edge router against live listeners.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use axum_test::TestServer;
use book_exchange_core::{Error, ObjectId};
use book_exchange_notifications::UserDirectory;
use book_exchange_services::accounts::{NewUser, User};
use book_exchange_services::{AccountsService, LibraryClient, LibraryService, ServiceEnvironment};
use book_exchange_testing::{InMemoryCache, InMemoryDocumentStore, InMemoryEventBus};
use book_exchange_web::routes::{library_router, users_router};
use book_exchange_web::{ErrorResponse, HttpLibraryClient, HttpUserDirectory, gateway_router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

fn env() -> ServiceEnvironment {
    ServiceEnvironment::new(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryEventBus::new()),
    )
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn directory_resolves_registered_users() {
    let accounts = AccountsService::new(&env());
    let user = accounts
        .create_user(NewUser {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            password: String::new(),
        })
        .await
        .unwrap();
    let addr = serve(users_router(accounts)).await;
    let directory = HttpUserDirectory::new(format!("http://{addr}"));

    assert_eq!(directory.email_of(&user.id).await.unwrap(), "ada@example.org");
    assert!(matches!(
        directory.email_of(&ObjectId::new()).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn directory_reports_an_unreachable_service() {
    let directory = HttpUserDirectory::new(format!("http://{}", dead_address().await));

    let result = directory.email_of(&ObjectId::new()).await;

    assert!(matches!(result, Err(Error::DownstreamUnavailable(_))));
}

#[tokio::test]
async fn library_client_moves_books() {
    let library = LibraryService::new(&env());
    let addr = serve(library_router(library.clone())).await;
    let client = HttpLibraryClient::new(format!("http://{addr}"));
    let (user, book) = (ObjectId::new(), ObjectId::new());

    client.assign(&user, &book).await.unwrap();
    assert_eq!(library.list_user_books(&user).await.unwrap().len(), 1);

    client.unassign(&user, &book).await.unwrap();
    assert!(matches!(
        client.unassign(&user, &book).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn gateway_forwards_to_the_backend() {
    let accounts = AccountsService::new(&env());
    let backend = serve(users_router(accounts)).await;
    let backends = HashMap::from([("users".to_string(), format!("http://{backend}/"))]);
    let gateway = TestServer::new(gateway_router(backends, reqwest::Client::new())).unwrap();

    let created = gateway
        .post("/users/users")
        .json(&serde_json::json!({ "name": "Ada", "email": "ada@example.org" }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let user = created.json::<User>();

    let fetched = gateway.get(&format!("/users/users/{}", user.id)).await.json::<User>();
    assert_eq!(fetched.email, "ada@example.org");

    gateway
        .get(&format!("/users/users/{}", ObjectId::new()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_keeps_the_query_string() {
    let echo = Router::new().route(
        "/echo",
        get(|uri: axum::http::Uri| async move { uri.query().unwrap_or_default().to_string() }),
    );
    let backend = serve(echo).await;
    let backends = HashMap::from([("books".to_string(), format!("http://{backend}"))]);
    let gateway = TestServer::new(gateway_router(backends, reqwest::Client::new())).unwrap();

    let response = gateway.get("/books/echo").add_query_param("q", "dune").await;

    response.assert_status_ok();
    response.assert_text("q=dune");
}

#[tokio::test]
async fn gateway_rejects_unknown_services() {
    let gateway = TestServer::new(gateway_router(HashMap::new(), reqwest::Client::new())).unwrap();

    let response = gateway.get("/nowhere/books").await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<ErrorResponse>().code, "NOT_FOUND");
}

#[tokio::test]
async fn gateway_answers_bad_gateway_when_backend_is_down() {
    let backends = HashMap::from([("orders".to_string(), format!("http://{}", dead_address().await))]);
    let gateway = TestServer::new(gateway_router(backends, reqwest::Client::new())).unwrap();

    let response = gateway.get("/orders/orders").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(response.json::<ErrorResponse>().code, "DOWNSTREAM_UNAVAILABLE");
}
