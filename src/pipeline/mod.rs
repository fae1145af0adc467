//! Fetch domain: grouped dispatch over a bounded worker pool
//!
//! The [`Harvester`] drives one run: it pulls candidates from a
//! [`QueryIterator`](crate::search::QueryIterator) per query, packs their URLs
//! into groups of `G`, and submits each group to a [`WorkerPool`] of width
//! `P`. The dispatcher is the only writer of the retry ledger and the
//! in-flight set, so neither needs a lock.
//!
//! # Backpressure
//!
//! Before each submission the dispatcher waits for completions while `2P`
//! groups are in flight, so the in-flight set never grows past `2P`.
//!
//! # Retry
//!
//! Failed URLs are fed back into the next group until they have been retried
//! `retry_ceiling` times, after which they are dropped and reported. Filtered
//! URLs are never retried.

mod dispatcher;
mod pool;
mod worker;

pub use pool::WorkerPool;

use crate::codec::{FfmpegCodec, MediaCodec};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{ContentFetcher, YtDlpFetcher};
use crate::language::LanguagePolicy;
use crate::search::SearchProvider;
use crate::segment::ContentSegmenter;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Harvest run driver
#[derive(Clone)]
pub struct Harvester {
    config: Arc<Config>,
    provider: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    segmenter: Arc<ContentSegmenter>,
    policy: Arc<LanguagePolicy>,
    event_tx: broadcast::Sender<Event>,
}

impl Harvester {
    /// Create a harvester with explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when the configuration
    /// does not validate. Nothing is started in that case.
    pub fn new(
        config: Config,
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        codec: Arc<dyn MediaCodec>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::debug!(
            provider = provider.name(),
            fetcher = fetcher.name(),
            codec = codec.name(),
            "harvester configured"
        );
        Ok(Self {
            policy: Arc::new(config.language_policy()),
            config: Arc::new(config),
            provider,
            fetcher,
            segmenter: Arc::new(ContentSegmenter::new(codec)),
            event_tx,
        })
    }

    /// Create a harvester using yt-dlp and ffmpeg resolved from the tools config
    pub fn with_tools(config: Config, provider: Arc<dyn SearchProvider>) -> Result<Self> {
        let tools = &config.tools;
        let fetcher = YtDlpFetcher::resolve(
            tools.ytdlp_path.as_deref(),
            tools.search_path,
            &tools.media_format,
        )?;
        let codec = FfmpegCodec::resolve(tools.ffmpeg_path.as_deref(), tools.search_path)?;
        Self::new(config, provider, Arc::new(fetcher), Arc::new(codec))
    }

    /// Subscribe to harvest events
    ///
    /// Slow subscribers miss events once the channel buffer overflows.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Validated configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Language policy applied to every group
    pub fn policy(&self) -> &LanguagePolicy {
        &self.policy
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
