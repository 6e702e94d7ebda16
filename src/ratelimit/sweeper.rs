//! Background eviction of stale request logs.
//!
//! The sweeper never admits or denies anything. On each tick it prunes every
//! log with a coarse max-age and drops the keys left empty, so memory tracks
//! the number of active keys rather than total request history.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::limiter::RateLimiter;
use crate::config::SweeperConfig;
use crate::error::Result;

/// Periodically purges stale keys from a limiter.
#[derive(Debug)]
pub struct Sweeper {
    limiter: Arc<RateLimiter>,
    config: SweeperConfig,
}

impl Sweeper {
    /// Create a sweeper for `limiter`.
    ///
    /// Fails if `config.max_age` does not exceed the limiter's longest policy window.
    pub fn new(limiter: Arc<RateLimiter>, config: SweeperConfig) -> Result<Self> {
        config.validate(limiter.policies())?;
        Ok(Self { limiter, config })
    }

    /// Run one sweep now. Returns the number of keys removed.
    pub fn sweep_once(&self) -> usize {
        let before = self.limiter.tracked_keys();
        let removed = self.limiter.sweep(self.config.max_age());

        debug!(
            tracked_before = before,
            removed = removed,
            "Swept request logs"
        );
        removed
    }

    /// Start sweeping on the configured interval.
    ///
    /// The first sweep runs one interval after spawning. The task stops when
    /// [`SweeperHandle::shutdown`] is called or the handle is dropped.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = self.config.interval();

        info!(
            interval_secs = self.config.interval_secs,
            max_age_secs = self.config.max_age_secs,
            "Starting eviction sweeper"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                }
            }

            info!("Eviction sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone if it panicked; the join below reports that.
        let _ = self.shutdown_tx.send(());
        self.task.await?;
        Ok(())
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
