//! Dispatch loop: grouping, backpressure, retry bookkeeping and drain.

use super::Harvester;
use super::pool::WorkerPool;
use super::worker::WorkerContext;
use crate::language::contains_cjk;
use crate::retry::{RetryDecision, RetryTracker};
use crate::search::QueryIterator;
use crate::types::{DownloadGroup, Event, FailedItem, GroupOutcome, HarvestReport};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

type InFlight = FuturesUnordered<BoxFuture<'static, (u64, GroupOutcome)>>;

/// Dispatcher-owned run state
struct Ledger {
    retries: RetryTracker,
    report: HarvestReport,
    /// Group id -> URLs, for groups not yet reported
    outstanding: HashMap<u64, Vec<String>>,
    next_group: u64,
    /// Group being accumulated (new candidates and retries)
    current: Vec<String>,
}

impl Ledger {
    fn new(retry_ceiling: u32) -> Self {
        Self {
            retries: RetryTracker::new(retry_ceiling),
            report: HarvestReport::default(),
            outstanding: HashMap::new(),
            next_group: 0,
            current: Vec::new(),
        }
    }

    fn take_group(&mut self, group_size: usize) -> Vec<String> {
        let take = self.current.len().min(group_size);
        self.current.drain(..take).collect()
    }

    fn finish(mut self) -> HarvestReport {
        self.report.abandoned.append(&mut self.current);
        for (_, urls) in self.outstanding.drain() {
            self.report.abandoned.extend(urls);
        }
        self.report
    }
}

impl Harvester {
    /// Run every query to completion (or until `cancel` fires)
    ///
    /// Queries run one after another; their candidates feed the same pool.
    /// A URL seen by an earlier query is not enqueued again. Cancellation
    /// stops new submissions, then waits up to `shutdown_timeout` for groups
    /// in flight; URLs that never finished are reported as abandoned.
    pub async fn run(&self, queries: &[String], cancel: CancellationToken) -> HarvestReport {
        let span = info_span!(
            "harvest",
            queries = queries.len(),
            parallel = self.config.download.parallel,
            group_size = self.config.download.group_size
        );
        self.dispatch(queries, cancel).instrument(span).await
    }

    async fn dispatch(&self, queries: &[String], cancel: CancellationToken) -> HarvestReport {
        let download = &self.config.download;
        let pool = WorkerPool::new(
            download.parallel,
            Arc::new(WorkerContext {
                fetcher: Arc::clone(&self.fetcher),
                segmenter: Arc::clone(&self.segmenter),
                output_root: download.output_root.clone(),
                item_timeout: download.item_timeout,
                skip_completed: download.skip_completed,
                cancel: cancel.clone(),
            }),
        );
        let group_size = download.group_size;
        let mut in_flight = InFlight::new();
        let mut ledger = Ledger::new(download.retry_ceiling);
        let mut seen = HashSet::new();

        info!(
            in_flight_cap = self.config.in_flight_cap(),
            retry_ceiling = download.retry_ceiling,
            "harvest started"
        );

        'queries: for query in queries {
            if cancel.is_cancelled() {
                break;
            }
            let mut candidates = QueryIterator::new(
                Arc::clone(&self.provider),
                query.clone(),
                self.config.search.page_limit,
            );
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'queries,
                    next = candidates.next() => next,
                };
                let Some(candidate) = next else { break };

                if self.config.search.require_cjk_title && !contains_cjk(&candidate.title) {
                    warn!(url = %candidate.url, title = %candidate.title, "title has no CJK characters, skipping");
                    continue;
                }
                if !seen.insert(candidate.url.clone()) {
                    debug!(url = %candidate.url, "duplicate candidate, skipping");
                    continue;
                }

                ledger.current.push(candidate.url);
                while ledger.current.len() >= group_size {
                    let group = ledger.take_group(group_size);
                    if !self
                        .submit(&pool, &mut in_flight, &mut ledger, group, &cancel)
                        .await
                    {
                        break 'queries;
                    }
                }
            }
            debug!(query = %query, pages = candidates.pages_fetched(), "query finished");
        }

        // Stream exhausted: flush partial groups and retries until nothing is in flight
        while !cancel.is_cancelled() {
            if !ledger.current.is_empty() {
                let group = ledger.take_group(group_size);
                if !self
                    .submit(&pool, &mut in_flight, &mut ledger, group, &cancel)
                    .await
                {
                    break;
                }
                continue;
            }
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = in_flight.next() => next,
            };
            match next {
                Some((id, outcome)) => self.harvest(&mut ledger, id, outcome, true),
                None => break,
            }
        }

        if cancel.is_cancelled() {
            self.shutdown_drain(&mut in_flight, &mut ledger).await;
        }

        let report = ledger.finish();
        info!(
            succeeded = report.succeeded.len(),
            filtered = report.filtered.len(),
            dropped = report.dropped.len(),
            abandoned = report.abandoned.len(),
            groups = report.groups_submitted,
            peak_in_flight = report.peak_in_flight,
            "harvest finished"
        );
        self.emit(Event::HarvestFinished {
            succeeded: report.succeeded.len(),
            filtered: report.filtered.len(),
            dropped: report.dropped.len(),
            abandoned: report.abandoned.len(),
        });
        report
    }

    /// Submit one group, first waiting while the in-flight set is at capacity
    ///
    /// Returns false (and abandons the group) when cancelled while waiting.
    async fn submit(
        &self,
        pool: &WorkerPool,
        in_flight: &mut InFlight,
        ledger: &mut Ledger,
        urls: Vec<String>,
        cancel: &CancellationToken,
    ) -> bool {
        let cap = self.config.in_flight_cap();
        while in_flight.len() >= cap {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    ledger.report.abandoned.extend(urls);
                    return false;
                }
                next = in_flight.next() => next,
            };
            if let Some((id, outcome)) = next {
                self.harvest(ledger, id, outcome, true);
            }
        }

        let id = ledger.next_group;
        ledger.next_group += 1;
        ledger.outstanding.insert(id, urls.clone());
        let size = urls.len();
        let outcome = pool.submit(DownloadGroup::new(urls), Arc::clone(&self.policy));
        in_flight.push(async move { (id, outcome.await) }.boxed());

        ledger.report.groups_submitted += 1;
        ledger.report.peak_in_flight = ledger.report.peak_in_flight.max(in_flight.len());
        debug!(group = id, size, in_flight = in_flight.len(), "group submitted");
        true
    }

    /// Fold one group's partition into the ledger
    ///
    /// With `requeue` unset (shutdown), failures with budget left are
    /// abandoned instead of re-entering a group.
    fn harvest(&self, ledger: &mut Ledger, id: u64, outcome: GroupOutcome, requeue: bool) {
        ledger.outstanding.remove(&id);
        info!(
            group = id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            filtered = outcome.filtered.len(),
            abandoned = outcome.abandoned.len(),
            "group completed"
        );
        self.emit(Event::GroupCompleted {
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            filtered: outcome.filtered.len(),
        });

        let report = &mut ledger.report;
        report.succeeded.extend(outcome.succeeded);
        report.abandoned.extend(outcome.abandoned);
        for url in outcome.filtered {
            self.emit(Event::ItemFiltered { url: url.clone() });
            report.filtered.push(url);
        }

        for FailedItem { url, reason } in outcome.failed {
            match ledger.retries.record_failure(&url) {
                RetryDecision::Retry { attempt } if requeue => {
                    warn!(url = %url, attempt, reason = %reason, "retrying item");
                    self.emit(Event::ItemRetrying {
                        url: url.clone(),
                        attempt,
                    });
                    ledger.current.push(url);
                }
                RetryDecision::Retry { .. } => report.abandoned.push(url),
                RetryDecision::Drop { retries } => {
                    error!(url = %url, retries, reason = %reason, "retry ceiling reached, dropping item");
                    self.emit(Event::ItemDropped {
                        url: url.clone(),
                        reason: reason.clone(),
                    });
                    report.dropped.push(FailedItem { url, reason });
                }
            }
        }
    }

    async fn shutdown_drain(&self, in_flight: &mut InFlight, ledger: &mut Ledger) {
        let timeout = self.config.download.shutdown_timeout;
        info!(
            in_flight = in_flight.len(),
            timeout_secs = timeout.as_secs(),
            "cancelled, waiting for in-flight groups"
        );
        let drained = tokio::time::timeout(timeout, async {
            while let Some((id, outcome)) = in_flight.next().await {
                self.harvest(ledger, id, outcome, false);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                groups = ledger.outstanding.len(),
                "shutdown timeout elapsed, abandoning unfinished groups"
            );
        }
        // Dropping the submission futures aborts their tasks
        in_flight.clear();
    }
}
