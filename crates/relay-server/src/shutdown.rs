//! Graceful shutdown: one token for every connection task, plus a tracker
//! to wait for them.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default time to wait for connections to drain.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cancels and drains connection tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection future so [`drain`](Self::drain) waits for it.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.tasks.track_future(future)
    }

    /// Tracked futures still running.
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel everything and wait up to `timeout` for tracked tasks.
    ///
    /// Returns `false` if some tasks were still running at the deadline.
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let _ = self.tasks.close();
        info!(
            task_count = self.tasks.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for connections to close"
        );
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(remaining = self.tasks.len(), "shutdown timed out after {timeout:?}");
            return false;
        }
        true
    }
}
