//! In-process tick scheduler
//!
//! Fires [`SyncOrchestrator::tick`] on a fixed interval. A tick that overruns
//! the interval causes the missed firings to be skipped rather than queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::orchestrator::SyncOrchestrator;

pub struct TickScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl TickScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run in the background until the task is aborted
    pub fn start(self) -> JoinHandle<u64> {
        tokio::spawn(self.run_until(std::future::pending::<()>()))
    }

    /// Tick immediately, then every interval, until `shutdown` resolves
    ///
    /// Returns the number of ticks performed.
    pub async fn run_until<F>(self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs(),
            organizations = ?self.orchestrator.organizations(),
            "Sync scheduler started"
        );

        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.orchestrator.tick().await;
                    ticks += 1;
                },
            }
        }

        info!(ticks, "Sync scheduler stopped");
        ticks
    }
}
