//! Graceful shutdown.
//!
//! Binaries stop accepting requests when [`shutdown_signal`] resolves, tell
//! their background tasks to stop through a broadcast channel, and give those
//! tasks a bounded time to finish with [`await_tasks`].

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wait for a termination signal (Ctrl+C or SIGTERM).
///
/// If a signal handler cannot be installed the failure is logged and that
/// signal source is ignored.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for background tasks, giving each at most `timeout`.
///
/// Returns the number of tasks that stopped cleanly.
pub async fn await_tasks(handles: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    let mut clean = 0;
    for (idx, handle) in handles.into_iter().enumerate() {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!(task = idx, "Background task stopped gracefully");
                clean += 1;
            }
            Ok(Err(e)) => warn!(task = idx, error = %e, "Background task failed"),
            Err(_) => warn!(task = idx, "Background task shutdown timed out"),
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_clean_and_timed_out_tasks() {
        let quick = tokio::spawn(async {});
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let clean = await_tasks(vec![quick, slow], Duration::from_millis(20)).await;
        assert_eq!(clean, 1);
    }
}
