//! Catalogue service: books, filtered lists and search.

use book_exchange_runtime::metrics::MetricsRecorder;
use book_exchange_server::telemetry::init_tracing;
use book_exchange_server::{Config, connect, serve};
use book_exchange_services::CatalogueService;
use book_exchange_web::routes::books_router;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("book_exchange=info,tower_http=info")?;
    let config = Config::from_env();
    info!(port = config.server.port, "Starting catalogue service");

    let recorder = MetricsRecorder::install()?;
    let env = connect(&config).await?;

    serve("catalogue", books_router(CatalogueService::new(&env)), recorder, &config).await?;
    Ok(())
}
