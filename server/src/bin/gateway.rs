//! Edge router: `/<service>/<tail>` to the configured backends.

use axum::Router;
use book_exchange_runtime::metrics::MetricsRecorder;
use book_exchange_server::telemetry::init_tracing;
use book_exchange_server::{Config, serve};
use book_exchange_web::gateway_router;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("book_exchange=info,tower_http=info")?;
    let config = Config::from_env();
    for (service, url) in &config.backends {
        info!(service = %service, url = %url, "Backend registered");
    }

    let recorder = MetricsRecorder::install()?;
    let router: Router = gateway_router(config.backends.clone(), reqwest::Client::new());

    serve("gateway", router, recorder, &config).await?;
    Ok(())
}
