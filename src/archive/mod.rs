//! Archive domain: periodic transfer of completed units
//!
//! The [`ArchivePorter`] scans the output root once per cycle. A directory is
//! eligible when it holds the `_SUCCESS` sentinel, does not carry the
//! `.mark` suffix and was not already handled by this porter (tracked in
//! [`SyncState`]). Eligible units are transferred according to the
//! [`PackMode`]; afterwards the local unit is deleted (`clean`) or renamed
//! with the marker suffix. A failed transfer leaves the unit untouched for the
//! next cycle.
//!
//! Without a destination the porter only tallies statistics and never
//! touches a file.
//!
//! [`ArchiveDaemon`] runs a porter on a [`PeriodicTask`].

mod pack;
mod periodic;
mod transport;

pub use pack::TarPacker;
pub use periodic::{PeriodicJob, PeriodicTask};
pub use transport::{HdfsTransport, LocalTransport, Transport};

use crate::config::{Config, Destination, PackMode};
use crate::error::{Result, TransferError};
use crate::unit;
use crate::utils::remove_path;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// Units already handled by one porter, plus aggregate counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    transferred: HashSet<String>,
    unit_count: u64,
    duration_secs: u64,
}

impl SyncState {
    /// Was the unit already handled?
    pub fn contains(&self, unit: &str) -> bool {
        self.transferred.contains(unit)
    }

    /// Identities of handled units
    pub fn transferred(&self) -> &HashSet<String> {
        &self.transferred
    }

    /// Number of handled units
    pub fn unit_count(&self) -> u64 {
        self.unit_count
    }

    /// Sum of the handled units' media durations
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    fn record(&mut self, unit: &str, duration_secs: u64) {
        if self.transferred.insert(unit.to_string()) {
            self.unit_count += 1;
            self.duration_secs += duration_secs;
        }
    }
}

/// Outcome of one scan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Units transferred (or tallied, in statistics mode) this cycle
    pub transferred: Vec<String>,
    /// Units whose transfer failed; retried next cycle
    pub failed: Vec<String>,
    /// Directories that were not eligible
    pub skipped: usize,
}

enum PorterMode {
    Statistics,
    Transfer {
        transport: Box<dyn Transport>,
        packer: Option<TarPacker>,
        prepared: bool,
    },
}

/// Scans the output root and archives completed units
pub struct ArchivePorter {
    output_root: PathBuf,
    mode: PorterMode,
    pack_mode: PackMode,
    clean: bool,
    state: SyncState,
    span: tracing::Span,
}

#[derive(Deserialize)]
struct DescriptorDuration {
    #[serde(default)]
    duration_secs: Option<u64>,
}

impl ArchivePorter {
    /// Porter that only tallies units and never modifies the output root
    pub fn statistics(output_root: impl Into<PathBuf>) -> Self {
        let output_root = output_root.into();
        let span = tracing::info_span!("archive", mode = "statistics", root = %output_root.display());
        Self {
            output_root,
            mode: PorterMode::Statistics,
            pack_mode: PackMode::default(),
            clean: false,
            state: SyncState::default(),
            span,
        }
    }

    /// Porter transferring into `transport`
    ///
    /// # Errors
    ///
    /// `tar` mode without a packer is a configuration error.
    pub fn new(
        output_root: impl Into<PathBuf>,
        transport: Box<dyn Transport>,
        pack_mode: PackMode,
        clean: bool,
        packer: Option<TarPacker>,
    ) -> Result<Self> {
        if pack_mode == PackMode::Tar && packer.is_none() {
            return Err(crate::Error::config("tar_path", "tar pack mode requires the tar binary"));
        }
        let output_root = output_root.into();
        let span = tracing::info_span!(
            "archive",
            mode = %pack_mode,
            destination = %transport.describe(),
            clean
        );
        Ok(Self {
            output_root,
            mode: PorterMode::Transfer {
                transport,
                packer,
                prepared: false,
            },
            pack_mode,
            clean,
            state: SyncState::default(),
            span,
        })
    }

    /// Build the porter the configuration describes
    ///
    /// Resolves the external binaries the chosen destination and pack mode
    /// need; a missing binary is fatal here, before anything starts.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let archive = &config.archive;
        let tools = &config.tools;
        let transport: Box<dyn Transport> = match config.destination()? {
            Destination::Statistics => return Ok(Self::statistics(config.output_root())),
            Destination::Local(path) => Box::new(LocalTransport::new(path)),
            Destination::Distributed(uri) => Box::new(HdfsTransport::resolve(
                tools.hadoop_path.as_deref(),
                tools.search_path,
                &uri,
            )?),
        };
        let packer = match archive.pack_mode {
            PackMode::Tar => Some(TarPacker::resolve(tools.tar_path.as_deref(), tools.search_path)?),
            PackMode::Raw | PackMode::Folder => None,
        };
        Self::new(
            config.output_root(),
            transport,
            archive.pack_mode,
            archive.clean,
            packer,
        )
    }

    /// Handled units and counters
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Consume the porter, keeping its state
    pub fn into_state(self) -> SyncState {
        self.state
    }

    /// True for the statistics-only variant
    pub fn is_statistics(&self) -> bool {
        matches!(self.mode, PorterMode::Statistics)
    }

    /// Create the destination root; failures are retried on the next cycle
    pub async fn prepare(&mut self) -> std::result::Result<(), TransferError> {
        if let PorterMode::Transfer {
            transport,
            prepared,
            ..
        } = &mut self.mode
            && !*prepared
        {
            transport.prepare().await?;
            *prepared = true;
        }
        Ok(())
    }

    /// Run one scan-and-transfer cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let span = self.span.clone();
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Err(e) = self.prepare().await {
            warn!(error = %e, "destination unavailable, skipping cycle");
            return report;
        }

        let units = match self.list_units().await {
            Ok(units) => units,
            Err(e) => {
                warn!(error = %e, "cannot list output root");
                return report;
            }
        };

        for name in units {
            let dir = self.output_root.join(&name);
            if name.starts_with('.')
                || unit::is_marked(&name)
                || self.state.contains(&name)
                || !unit::is_complete(&dir).await
            {
                report.skipped += 1;
                continue;
            }

            let duration = read_duration(&dir, &name).await;
            match self.handle_unit(&dir, &name).await {
                Ok(()) => {
                    // Recorded even if finalizing fails, so the unit is never sent twice
                    if !self.is_statistics()
                        && let Err(e) = self.finalize(&dir, &name).await
                    {
                        warn!(unit = %name, error = %e, "unit transferred but not finalized");
                    }
                    self.state.record(&name, duration);
                    report.transferred.push(name);
                }
                Err(e) => {
                    warn!(unit = %name, error = %e, "transfer failed, retrying next cycle");
                    report.failed.push(name);
                }
            }
        }

        info!(
            transferred = report.transferred.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            total_units = self.state.unit_count(),
            total_duration_secs = self.state.duration_secs(),
            "archive cycle finished"
        );
        report
    }

    /// Directory names directly under the output root, sorted
    async fn list_units(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.output_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn handle_unit(&self, dir: &Path, name: &str) -> std::result::Result<(), TransferError> {
        let PorterMode::Transfer {
            transport, packer, ..
        } = &self.mode
        else {
            debug!(unit = %name, "unit counted");
            return Ok(());
        };
        let transport = transport.as_ref();

        match self.pack_mode {
            PackMode::Tar => {
                let packer = packer.as_ref().ok_or_else(|| TransferError::Pack {
                    unit: name.to_string(),
                    reason: "no tar binary configured".to_string(),
                })?;
                let archive_name = TarPacker::archive_name(name);
                let archive = self.output_root.join(&archive_name);
                packer.pack(&self.output_root, name, &archive).await?;
                let result = transport.put(&archive, &archive_name, true).await;
                // The local archive goes either way; a retry re-packs
                let _ = remove_path(&archive).await;
                result?;
            }
            PackMode::Raw => {
                let members = raw_members(dir).await.map_err(|e| TransferError::Upload {
                    path: dir.to_path_buf(),
                    destination: transport.describe(),
                    reason: e.to_string(),
                })?;
                // Members are copied; finalize removes the unit once all of them landed
                for (path, file_name) in members {
                    transport.put(&path, &file_name, false).await?;
                }
            }
            PackMode::Folder => transport.put(dir, name, self.clean).await?,
        }

        info!(unit = %name, "unit transferred");
        Ok(())
    }

    async fn finalize(&self, dir: &Path, name: &str) -> std::result::Result<(), TransferError> {
        let result = if self.clean {
            remove_path(dir).await
        } else {
            tokio::fs::rename(dir, unit::marked_path(dir))
                .await
                .map_err(Into::into)
        };
        result.map_err(|e| TransferError::Finalize {
            unit: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Entries of a unit transferred individually in raw mode (sentinel excluded)
async fn raw_members(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut members = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name == unit::SENTINEL_FILE {
            continue;
        }
        members.push((entry.path(), name));
    }
    members.sort();
    Ok(members)
}

/// Media duration recorded in a unit's descriptor, zero when unreadable
async fn read_duration(dir: &Path, name: &str) -> u64 {
    let Ok(raw) = tokio::fs::read(unit::descriptor_path(dir, name)).await else {
        return 0;
    };
    serde_json::from_slice::<DescriptorDuration>(&raw)
        .ok()
        .and_then(|d| d.duration_secs)
        .unwrap_or(0)
}

#[async_trait]
impl PeriodicJob for ArchivePorter {
    async fn tick(&mut self) {
        self.run_cycle().await;
    }

    fn name(&self) -> &'static str {
        "archive-porter"
    }
}

/// Background archive daemon
pub struct ArchiveDaemon {
    task: PeriodicTask<ArchivePorter>,
    final_sweep: bool,
}

impl ArchiveDaemon {
    /// Start `porter`, cycling immediately and then every `interval`
    pub fn start(porter: ArchivePorter, interval: Duration, final_sweep: bool) -> Self {
        info!(
            statistics = porter.is_statistics(),
            interval_secs = interval.as_secs(),
            "archive daemon started"
        );
        Self {
            task: PeriodicTask::start(porter, interval),
            final_sweep,
        }
    }

    /// Build and start the daemon the configuration describes
    pub fn from_config(config: &Config) -> Result<Self> {
        let porter = ArchivePorter::from_config(config)?;
        Ok(Self::start(
            porter,
            config.archive.sync_interval,
            config.archive.final_sweep,
        ))
    }

    /// Stop after the cycle in progress, then run the final sweep if configured
    pub async fn stop(self) -> Result<ArchivePorter> {
        let sweep = self.final_sweep;
        self.shutdown(sweep).await
    }

    /// Stop after the cycle in progress without a final sweep
    pub async fn stop_now(self) -> Result<ArchivePorter> {
        self.shutdown(false).await
    }

    async fn shutdown(self, sweep: bool) -> Result<ArchivePorter> {
        let mut porter = self.task.stop().await?;
        if sweep {
            debug!("running final archive sweep");
            porter.run_cycle().await;
        }
        info!(units = porter.state().unit_count(), "archive daemon stopped");
        Ok(porter)
    }
}

#[cfg(test)]
mod tests;
