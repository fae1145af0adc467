//! One harvest run with its archive daemon
//!
//! [`HarvestSession`] wires both concurrency domains from a single validated
//! [`Config`]: the daemon starts first, the harvester runs every query, and
//! the daemon is stopped (with its final sweep) once the harvest is done.
//! A cancelled session stops the daemon without the sweep.
//! The domains share nothing but the output root.

use crate::archive::{ArchiveDaemon, ArchivePorter, SyncState};
use crate::codec::MediaCodec;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::ContentFetcher;
use crate::pipeline::Harvester;
use crate::search::SearchProvider;
use crate::types::HarvestReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of a whole session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Harvest partition
    pub harvest: HarvestReport,
    /// Archive state after the daemon stopped
    pub archive: SyncState,
}

/// Harvester plus archive porter, ready to run
pub struct HarvestSession {
    harvester: Harvester,
    porter: ArchivePorter,
    sync_interval: Duration,
    final_sweep: bool,
}

impl HarvestSession {
    /// Build a session using yt-dlp and ffmpeg from the tools config
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or a missing external binary.
    /// Nothing is started in that case.
    pub fn new(config: Config, provider: Arc<dyn SearchProvider>) -> Result<Self> {
        let porter = ArchivePorter::from_config(&config)?;
        let (sync_interval, final_sweep) = (config.archive.sync_interval, config.archive.final_sweep);
        let harvester = Harvester::with_tools(config, provider)?;
        Ok(Self::from_parts(harvester, porter, sync_interval, final_sweep))
    }

    /// Build a session with explicit fetch collaborators
    pub fn with_collaborators(
        config: Config,
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        codec: Arc<dyn MediaCodec>,
    ) -> Result<Self> {
        let porter = ArchivePorter::from_config(&config)?;
        let (sync_interval, final_sweep) = (config.archive.sync_interval, config.archive.final_sweep);
        let harvester = Harvester::new(config, provider, fetcher, codec)?;
        Ok(Self::from_parts(harvester, porter, sync_interval, final_sweep))
    }

    /// Assemble a session from already built parts
    pub fn from_parts(
        harvester: Harvester,
        porter: ArchivePorter,
        sync_interval: Duration,
        final_sweep: bool,
    ) -> Self {
        Self {
            harvester,
            porter,
            sync_interval,
            final_sweep,
        }
    }

    /// The harvester, e.g. to subscribe to events before running
    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }

    /// Run every query, archiving completed units in the background
    ///
    /// Cancelling `cancel` stops the harvest (see [`Harvester::run`]); the
    /// archive daemon then finishes its current cycle and stops without the
    /// final sweep. Completed units it did not reach stay in the output root.
    pub async fn run(self, queries: &[String], cancel: CancellationToken) -> Result<SessionReport> {
        let daemon = ArchiveDaemon::start(self.porter, self.sync_interval, self.final_sweep);
        let harvest = self.harvester.run(queries, cancel.clone()).await;
        let porter = if cancel.is_cancelled() {
            info!("session cancelled, skipping final archive sweep");
            daemon.stop_now().await?
        } else {
            daemon.stop().await?
        };
        let archive = porter.into_state();

        info!(
            succeeded = harvest.succeeded.len(),
            archived = archive.unit_count(),
            archived_duration_secs = archive.duration_secs(),
            "session finished"
        );
        Ok(SessionReport { harvest, archive })
    }
}
