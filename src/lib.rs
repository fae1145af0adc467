//! # harvest-dl
//!
//! Concurrent caption-aligned media harvesting with background archival.
//!
//! ## Design Philosophy
//!
//! harvest-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Bounded** - A fixed-width worker pool, at most `2P` groups in flight and
//!   a retry ceiling per item
//! - **Crash-safe** - A unit is handed to the archive side only once its
//!   `_SUCCESS` sentinel exists
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use harvest_dl::{Config, HarvestSession, UrlListProvider, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.must_languages = vec!["en".to_string()];
//!     config.download.parallel = 4;
//!
//!     let provider = UrlListProvider::parse("https://www.youtube.com/watch?v=abc123 demo")?;
//!     let session = HarvestSession::new(config, Arc::new(provider))?;
//!
//!     // Subscribe to events
//!     let mut events = session.harvester().subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = run_with_shutdown(session, &["list".to_string()]).await?;
//!     println!("archived {} units", report.archive.unit_count());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive daemon: sentinel scan, packaging and transfer
pub mod archive;
/// Audio slicing and frame capture
pub mod codec;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Item probing and media download
pub mod fetcher;
/// Caption language policy
pub mod language;
/// Grouped dispatch over the worker pool
pub mod pipeline;
/// Retry ledger with a per-item ceiling
pub mod retry;
/// Paginated candidate search
pub mod search;
/// Caption parsing and content segmentation
pub mod segment;
/// Harvester plus archive daemon orchestration
pub mod session;
/// Core types and events
pub mod types;
/// On-disk unit layout and sentinel contract
pub mod unit;
/// Utility functions
pub mod utils;


// Re-export commonly used types
pub use archive::{
    ArchiveDaemon, ArchivePorter, CycleReport, HdfsTransport, LocalTransport, PeriodicJob,
    PeriodicTask, SyncState, TarPacker, Transport,
};
pub use codec::{FfmpegCodec, MediaCodec};
pub use config::{Config, Destination, PackMode};
pub use error::{Error, Result, SegmentationError, TransferError};
pub use fetcher::{ContentFetcher, YtDlpFetcher};
pub use language::LanguagePolicy;
pub use pipeline::{Harvester, WorkerPool};
pub use retry::{RetryDecision, RetryTracker};
pub use search::{QueryIterator, SearchPage, SearchProvider, UrlListProvider};
pub use segment::{ContentDescriptor, ContentSegment, ContentSegmenter};
pub use session::{HarvestSession, SessionReport};
pub use types::{
    Candidate, Event, FailedItem, FetchedMedia, GroupOutcome, HarvestReport, ItemMetadata,
};

/// Helper function to run a session with graceful signal handling.
///
/// Runs every query and cancels the session when a termination signal
/// arrives. In-flight groups then get `shutdown_timeout` to finish and the
/// archive daemon completes its current cycle. The final sweep is skipped;
/// completed units it did not reach are picked up by the next run.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(session: HarvestSession, queries: &[String]) -> Result<SessionReport> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    let result = session.run(queries, cancel).await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, cancelling harvest"),
                _ = sigint.recv() => tracing::info!("received SIGINT, cancelling harvest"),
            }
        }
        (Err(e), Ok(mut only)) | (Ok(mut only), Err(e)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal, cancelling harvest");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, cancelling harvest"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C signal"),
    }
}
