//! Supervised tasks that outlive a sync pass
//!
//! The official backup refresh runs after a pass has already reported its
//! result. Instead of detaching it, the engine registers it here so shutdown
//! can either wait for it or cancel it.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// How to treat pending tasks on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let every task run to completion
    Wait,
    /// Cancel tasks at their next await point
    Abandon,
}

/// Registry of background tasks
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl BackgroundTasks {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a task until it finishes or the registry is abandoned
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!(task = name, "background task abandoned"),
                _ = task => debug!(task = name, "background task finished"),
            }
        });
    }

    /// Number of tasks still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every running task
    ///
    /// Tasks spawned afterwards are still accepted.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops the registry
    ///
    /// After [`ShutdownMode::Abandon`] newly spawned tasks are cancelled
    /// immediately.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Abandon {
            self.token.cancel();
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}
