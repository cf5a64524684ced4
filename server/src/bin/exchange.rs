//! Exchange service.
//!
//! Settlement moves books through the library service at `LIBRARY_URL`.

use book_exchange_runtime::metrics::MetricsRecorder;
use book_exchange_server::telemetry::init_tracing;
use book_exchange_server::{Config, connect, serve};
use book_exchange_services::ExchangeService;
use book_exchange_web::HttpLibraryClient;
use book_exchange_web::routes::exchange_router;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("book_exchange=info,tower_http=info")?;
    let config = Config::from_env();
    info!(port = config.server.port, library = %config.library_url, "Starting exchange service");

    let recorder = MetricsRecorder::install()?;
    let env = connect(&config).await?;
    let library = Arc::new(HttpLibraryClient::new(config.library_url.clone()));

    serve("exchange", exchange_router(ExchangeService::new(&env, library)), recorder, &config).await?;
    Ok(())
}
