//! Fixed-interval background task with cooperative stop
//!
//! [`PeriodicTask`] owns the job and its own [`CancellationToken`]. The job
//! runs once immediately and then every interval; a tick is never
//! interrupted, and ticks never overlap. [`PeriodicTask::stop`] waits for the
//! tick in progress and hands the job back.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

/// Work executed on every tick
#[async_trait]
pub trait PeriodicJob: Send + 'static {
    /// One unit of periodic work
    async fn tick(&mut self);

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Running periodic task
pub struct PeriodicTask<J: PeriodicJob> {
    cancel: CancellationToken,
    handle: JoinHandle<J>,
}

impl<J: PeriodicJob> PeriodicTask<J> {
    /// Spawn `job`, ticking immediately and then every `interval`
    pub fn start(mut job: J, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let span = tracing::info_span!("periodic", job = job.name(), interval_secs = interval.as_secs());

        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => job.tick().await,
                    }
                }
                debug!("periodic task stopped");
                job
            }
            .instrument(span),
        );

        Self { cancel, handle }
    }

    /// True once the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Disarm the timer, wait for the tick in progress and return the job
    pub async fn stop(self) -> Result<J> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| Error::Other(format!("periodic task failed: {}", e)))
    }
}
