//! Orders service.

use book_exchange_runtime::metrics::MetricsRecorder;
use book_exchange_server::telemetry::init_tracing;
use book_exchange_server::{Config, connect, serve};
use book_exchange_services::OrdersService;
use book_exchange_web::routes::orders_router;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("book_exchange=info,tower_http=info")?;
    let config = Config::from_env();
    info!(port = config.server.port, "Starting orders service");

    let recorder = MetricsRecorder::install()?;
    let env = connect(&config).await?;

    serve("orders", orders_router(OrdersService::new(&env)), recorder, &config).await?;
    Ok(())
}
