//! Shutdown coordination.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Root cancellation token for every long-running task.
///
/// Tasks receive child tokens, so cancelling the root reaches the probe
/// ticker, the connection races and the status server alike.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one task; cancelled with the root.
    pub fn child(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Duration) {
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(deadline, join_all(tasks)).await.is_err() {
            tracing::warn!(
                tasks = aborts.len(),
                deadline_secs = deadline.as_secs(),
                "Tasks still running at shutdown deadline, aborting"
            );
            for handle in aborts {
                handle.abort();
            }
        }
    }
}
