//! Fixed-width worker pool
//!
//! Every submission is spawned immediately and waits on a semaphore permit,
//! so at most `width` groups are being processed at any moment.

use super::worker::{WorkerContext, process_group};
use crate::language::LanguagePolicy;
use crate::types::{DownloadGroup, GroupOutcome};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::Instrument;

/// Bounded-concurrency executor for download groups
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    width: usize,
    ctx: Arc<WorkerContext>,
}

// Aborts the spawned task when the submission future is dropped unfinished
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl WorkerPool {
    pub(crate) fn new(width: usize, ctx: Arc<WorkerContext>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(width)),
            width,
            ctx,
        }
    }

    /// Pool width `P`
    pub fn width(&self) -> usize {
        self.width
    }

    /// Submit a group for processing under `policy`
    ///
    /// The returned future resolves to the group's partition. A task that
    /// panics reports all of its URLs as failed. Dropping the future before it
    /// resolves aborts the task.
    pub fn submit(
        &self,
        group: DownloadGroup,
        policy: Arc<LanguagePolicy>,
    ) -> impl Future<Output = GroupOutcome> + Send + 'static {
        let urls = group.urls().to_vec();
        let permits = Arc::clone(&self.permits);
        let ctx = Arc::clone(&self.ctx);
        let span = tracing::debug_span!("group", size = urls.len());

        let handle = tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return GroupOutcome {
                        abandoned: group.into_urls(),
                        ..Default::default()
                    };
                };
                process_group(ctx, group, policy).await
            }
            .instrument(span),
        );

        async move {
            let _guard = AbortOnDrop(handle.abort_handle());
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => GroupOutcome::all_failed(urls, &format!("worker task failed: {}", e)),
            }
        }
    }
}
