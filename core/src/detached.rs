//! Work that outlives the request that scheduled it.
//!
//! Cache population after a miss and cache invalidation after a commit run on
//! their own task with their own timeout. Cancelling the caller (a dropped
//! request future, an elapsed client deadline) does not cancel them.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawns futures detached from the caller, each bounded by a timeout.
#[derive(Debug, Clone, Copy)]
pub struct Detached {
    timeout: Duration,
}

impl Detached {
    /// Default bound for detached cache work.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a spawner with the given per-task timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-task timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `future` on the runtime.
    ///
    /// The returned handle resolves to `None` if the timeout elapsed first.
    /// Dropping the handle does not abort the task.
    pub fn spawn<F>(&self, label: &'static str, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let timeout = self.timeout;
        tokio::spawn(async move {
            if let Ok(output) = tokio::time::timeout(timeout, future).await {
                Some(output)
            } else {
                tracing::warn!(task = label, timeout = ?timeout, "Detached task timed out");
                None
            }
        })
    }
}

impl Default for Detached {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}
