//! Notification worker.
//!
//! Consumes every bus subject, resolves recipients through the accounts
//! service and sends mail over SMTP (or logs it when `SMTP_HOST` is empty).
//! `/health` and `/metrics` are served on `LISTEN_PORT`.

use axum::Router;
use book_exchange_core::subjects;
use book_exchange_notifications::{EmailSink, LogEmailSink, NotificationOrchestrator, SmtpEmailSink};
use book_exchange_runtime::EventConsumer;
use book_exchange_runtime::metrics::MetricsRecorder;
use book_exchange_runtime::shutdown::await_tasks;
use book_exchange_server::bootstrap::event_bus;
use book_exchange_server::telemetry::init_tracing;
use book_exchange_server::{Config, serve};
use book_exchange_web::HttpUserDirectory;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("book_exchange=info")?;
    let config = Config::from_env();
    info!(
        brokers = %config.bus_url,
        group = %config.consumer_group,
        accounts = %config.accounts_url,
        "Starting notification service"
    );

    let recorder = MetricsRecorder::install()?;

    let sink: Arc<dyn EmailSink> = if config.smtp.is_enabled() {
        info!(host = %config.smtp.host, port = config.smtp.port, "Sending mail over SMTP");
        Arc::new(SmtpEmailSink::new(
            &config.smtp.host,
            config.smtp.port,
            config.smtp.username.clone(),
            config.smtp.password.clone(),
            &config.smtp.sender,
        )?)
    } else {
        info!("SMTP_HOST is empty, logging mail instead of sending it");
        Arc::new(LogEmailSink::new())
    };
    let directory = Arc::new(HttpUserDirectory::new(config.accounts_url.clone()));
    let orchestrator = NotificationOrchestrator::new(directory, sink);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::builder()
        .name("notifications")
        .subjects(subjects::ALL.iter().map(ToString::to_string).collect())
        .event_bus(event_bus(&config, Some(&config.consumer_group))?)
        .handler(Arc::new(orchestrator))
        .shutdown(shutdown_rx)
        .build()?;
    let handle = consumer.spawn();

    serve("notifications", Router::new(), recorder, &config).await?;

    // Receivers may already be gone if the consumer exited on its own.
    let _ = shutdown_tx.send(());
    await_tasks(vec![handle], config.shutdown_timeout()).await;
    info!("Notification service stopped");
    Ok(())
}
