//! Periodic removal of expired cache entries.

use crate::cache::{Cache, MemoryCache};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owner of a running sweep task. Dropping it leaves the task running until
/// the cache itself is dropped; call [`SweepHandle::shutdown`] to stop it.
#[derive(Debug)]
pub struct SweepHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the sweep loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("Cache sweeper panicked: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl MemoryCache {
    /// Spawns the background sweep for this cache, ticking every `period`.
    ///
    /// A cache has at most one sweeper: returns `None` if one was already
    /// started. The task only holds a weak reference, so it also ends once
    /// the last strong reference to the cache is gone.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> Option<SweepHandle> {
        if !self.mark_sweeper_started() {
            tracing::warn!("Cache sweeper already running; ignoring second start");
            return None;
        }

        let cache = Arc::downgrade(self);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sweep_loop(cache, period, cancel.clone()));
        Some(SweepHandle { cancel, task })
    }
}

async fn sweep_loop(cache: Weak<MemoryCache>, period: Duration, cancel: CancellationToken) {
    info!("Starting cache sweeper with interval of {:?}", period);

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(cache) = cache.upgrade() else { break };
        let removed = cache.sweep_expired();
        if removed > 0 {
            info!("Cache sweep: removed {} expired entries, {} remaining", removed, cache.size());
        } else {
            debug!("Cache sweep: no expired entries found");
        }
    }

    info!("Cache sweeper stopped");
}
