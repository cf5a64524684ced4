//! Connecting the adapters and serving routers.

use crate::config::Config;
use axum::Router;
use book_exchange_core::cache::CacheError;
use book_exchange_core::detached::Detached;
use book_exchange_core::event_bus::{EventBus, EventBusError};
use book_exchange_core::repository::Entity;
use book_exchange_core::store::{CollectionSpec, StoreError};
use book_exchange_postgres::PostgresDocumentStore;
use book_exchange_redis::RedisCache;
use book_exchange_redpanda::RedpandaEventBus;
use book_exchange_runtime::ConsumerError;
use book_exchange_runtime::metrics::{MetricsError, MetricsRecorder};
use book_exchange_runtime::shutdown::shutdown_signal;
use book_exchange_services::ServiceEnvironment;
use book_exchange_services::accounts::User;
use book_exchange_services::catalogue::Book;
use book_exchange_services::exchange::ExchangeOffer;
use book_exchange_services::library::UserBook;
use book_exchange_services::orders::Order;
use book_exchange_web::{health_router, metrics_router, request_id_layer};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Startup failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The document store could not be reached or migrated.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// The cache could not be reached.
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    /// The bus client could not be built.
    #[error("bus: {0}")]
    Bus(#[from] EventBusError),
    /// The metrics recorder could not be installed.
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
    /// The notification consumer was misconfigured.
    #[error("consumer: {0}")]
    Consumer(#[from] ConsumerError),
    /// Binding or serving failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Every collection a service process may touch.
pub const COLLECTIONS: [CollectionSpec; 5] = [
    Book::COLLECTION,
    User::COLLECTION,
    UserBook::COLLECTION,
    ExchangeOffer::COLLECTION,
    Order::COLLECTION,
];

/// Bus client for `config`; `consumer_group` is needed only by subscribers.
///
/// # Errors
///
/// Returns [`BootstrapError::Bus`] if the client cannot be created.
pub fn event_bus(
    config: &Config,
    consumer_group: Option<&str>,
) -> Result<Arc<dyn EventBus>, BootstrapError> {
    let mut builder = RedpandaEventBus::builder().brokers(&config.bus_url);
    if let Some(group) = consumer_group {
        builder = builder.consumer_group(group);
    }
    Ok(Arc::new(builder.build()?))
}

/// Connect store, cache and bus and build the shared service environment.
///
/// # Errors
///
/// Fails if any adapter cannot be created or the store cannot be migrated.
pub async fn connect(config: &Config) -> Result<ServiceEnvironment, BootstrapError> {
    info!("Connecting to document store...");
    let store = PostgresDocumentStore::new(&config.store_uri).await?;
    store.migrate(&COLLECTIONS).await?;
    info!("Document store connected");

    info!("Connecting to cache...");
    let cache = RedisCache::new(&config.cache_uri).await?;
    info!("Cache connected");

    let bus = event_bus(config, None)?;
    info!(brokers = %config.bus_url, "Event bus client created");

    Ok(
        ServiceEnvironment::new(Arc::new(store), Arc::new(cache), bus)
            .with_detached(Detached::new(config.detached_task_timeout())),
    )
}

/// Serve `router` with `/health`, `/metrics`, request ids and request
/// tracing until a termination signal arrives.
///
/// # Errors
///
/// Fails if the listener cannot be bound or the server stops with an error.
pub async fn serve(
    service: &'static str,
    router: Router,
    recorder: MetricsRecorder,
    config: &Config,
) -> Result<(), BootstrapError> {
    let app = router
        .merge(health_router())
        .merge(metrics_router(recorder))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer());

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(service, address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(service, "Server stopped");
    Ok(())
}
