//! Per-group worker task
//!
//! A group is processed serially: probe, filter, fetch, segment for each URL
//! in submission order. Every URL ends in exactly one [`ItemOutcome`];
//! nothing here returns an error to the dispatcher.

use crate::error::{Error, Result};
use crate::fetcher::ContentFetcher;
use crate::language::LanguagePolicy;
use crate::search::item_id_from_url;
use crate::segment::ContentSegmenter;
use crate::types::{DownloadGroup, GroupOutcome, ItemOutcome};
use crate::unit;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Collaborators and settings shared by every task of one run
pub(crate) struct WorkerContext {
    pub(crate) fetcher: Arc<dyn ContentFetcher>,
    pub(crate) segmenter: Arc<ContentSegmenter>,
    pub(crate) output_root: PathBuf,
    pub(crate) item_timeout: Option<Duration>,
    pub(crate) skip_completed: bool,
    pub(crate) cancel: CancellationToken,
}

/// Process one group, checking for cancellation between items
pub(crate) async fn process_group(
    ctx: Arc<WorkerContext>,
    group: DownloadGroup,
    policy: Arc<LanguagePolicy>,
) -> GroupOutcome {
    let mut outcome = GroupOutcome::default();
    for url in group.into_urls() {
        let result = if ctx.cancel.is_cancelled() {
            ItemOutcome::Abandoned
        } else {
            process_item(&ctx, &url, &policy).await
        };
        outcome.record(url, result);
    }
    outcome
}

async fn process_item(ctx: &WorkerContext, url: &str, policy: &LanguagePolicy) -> ItemOutcome {
    if ctx.skip_completed
        && let Some(id) = item_id_from_url(url)
        && unit::is_complete(&unit::unit_dir(&ctx.output_root, &id)).await
    {
        debug!(url = %url, unit = %id, "unit already complete, skipping");
        return ItemOutcome::Succeeded;
    }

    let meta = match with_timeout(ctx.item_timeout, ctx.fetcher.probe(url)).await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(url = %url, error = %e, "metadata probe failed");
            return ItemOutcome::Failed(e.to_string());
        }
    };

    let Some(language) = policy.choose_language(&meta.caption_languages) else {
        debug!(
            url = %url,
            available = ?meta.caption_languages,
            "no caption language matches policy"
        );
        return ItemOutcome::Filtered;
    };

    let unit_dir = unit::unit_dir(&ctx.output_root, &meta.id);
    if ctx.skip_completed && unit::is_complete(&unit_dir).await {
        debug!(url = %url, unit = %meta.id, "unit already complete, skipping");
        return ItemOutcome::Succeeded;
    }

    let work = async {
        let media = ctx.fetcher.fetch(&meta, &language, &unit_dir).await?;
        ctx.segmenter
            .segment(&meta, &language, &media, &unit_dir)
            .await
            .map_err(|e| {
                error!(url = %url, unit = %meta.id, error = %e, "segmentation aborted");
                Error::from(e)
            })?;
        Ok::<(), Error>(())
    };

    match with_timeout(ctx.item_timeout, work).await {
        Ok(()) => {
            debug!(url = %url, unit = %meta.id, language = %language, "item complete");
            ItemOutcome::Succeeded
        }
        Err(e) => {
            if !matches!(e, Error::Segmentation(_)) {
                warn!(url = %url, error = %e, "fetch failed");
            }
            ItemOutcome::Failed(e.to_string())
        }
    }
}

async fn with_timeout<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Fetch(format!("timed out after {:?}", limit)))?,
        None => fut.await,
    }
}
