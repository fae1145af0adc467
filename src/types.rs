//! Core types for harvest-dl

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A search result not yet confirmed to satisfy the language policy
///
/// Immutable once produced by a query iterator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Platform identity
    pub id: String,
    /// Display title
    pub title: String,
    /// Source URL
    pub url: String,
}

/// Metadata returned by a probe (no media downloaded)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Platform identity, also the unit directory name
    pub id: String,
    /// Display title
    pub title: String,
    /// Source URL
    pub url: String,
    /// Caption languages the item offers
    pub caption_languages: BTreeSet<String>,
    /// Media duration in whole seconds, when known
    pub duration_secs: Option<u64>,
}

/// Files a fetch placed in the unit directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Media file the audio slices are cut from
    pub audio_source: PathBuf,
    /// Media file the still frames are captured from (may equal `audio_source`)
    pub video_source: PathBuf,
    /// Caption track in the chosen language
    pub caption_path: PathBuf,
}

/// An ordered, bounded set of candidate URLs handed to one worker task
///
/// Mutable only while the dispatcher accumulates it; once submitted it is
/// moved into exactly one task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadGroup {
    urls: Vec<String>,
}

impl DownloadGroup {
    /// Build a frozen group from URLs in submission order
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// URLs in submission order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Number of URLs in the group
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// True when the group holds no URL
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Consume the group, yielding its URLs
    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

/// Classification of one candidate after its worker finished with it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Fetch and segmentation completed and the sentinel was written
    Succeeded,
    /// Caption languages did not satisfy the policy
    Filtered,
    /// Probe, fetch or segmentation failed
    Failed(String),
    /// Not attempted because the run was cancelled
    Abandoned,
}

/// A failed URL with the reason reported by its worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Candidate URL
    pub url: String,
    /// Failure description
    pub reason: String,
}

/// Per-group partition returned by a worker task
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupOutcome {
    /// URLs that were fetched, segmented and sentineled
    pub succeeded: Vec<String>,
    /// URLs that failed and may be retried
    pub failed: Vec<FailedItem>,
    /// URLs rejected by the language policy
    pub filtered: Vec<String>,
    /// URLs the task never reached because of cancellation
    pub abandoned: Vec<String>,
}

impl GroupOutcome {
    /// Record the outcome of one URL
    pub fn record(&mut self, url: String, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded.push(url),
            ItemOutcome::Filtered => self.filtered.push(url),
            ItemOutcome::Failed(reason) => self.failed.push(FailedItem { url, reason }),
            ItemOutcome::Abandoned => self.abandoned.push(url),
        }
    }

    /// Outcome for a group whose task died without reporting
    pub fn all_failed(urls: Vec<String>, reason: &str) -> Self {
        Self {
            failed: urls
                .into_iter()
                .map(|url| FailedItem {
                    url,
                    reason: reason.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Final report of a harvest run
///
/// Every URL the dispatcher accepted lands in exactly one list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReport {
    /// Fully downloaded and segmented
    pub succeeded: Vec<String>,
    /// Rejected by the language policy
    pub filtered: Vec<String>,
    /// Failed after exhausting the retry ceiling
    pub dropped: Vec<FailedItem>,
    /// Not finished because the run was cancelled
    pub abandoned: Vec<String>,
    /// Number of groups submitted, retries included
    pub groups_submitted: usize,
    /// Highest number of groups in flight right after a submission
    pub peak_in_flight: usize,
}

impl HarvestReport {
    /// Total number of distinct URLs accounted for
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.filtered.len() + self.dropped.len() + self.abandoned.len()
    }
}

/// Event emitted by the harvester
///
/// Subscribe via [`crate::Harvester::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A worker task reported its group partition
    GroupCompleted {
        /// Succeeded count
        succeeded: usize,
        /// Failed count
        failed: usize,
        /// Filtered count
        filtered: usize,
    },

    /// A candidate was rejected by the language policy
    ItemFiltered {
        /// Candidate URL
        url: String,
    },

    /// A failed candidate re-entered a future group
    ItemRetrying {
        /// Candidate URL
        url: String,
        /// Retry number (1-based)
        attempt: u32,
    },

    /// A failed candidate reached the retry ceiling
    ItemDropped {
        /// Candidate URL
        url: String,
        /// Last failure reason
        reason: String,
    },

    /// The run finished (normally or after cancellation)
    HarvestFinished {
        /// Succeeded count
        succeeded: usize,
        /// Filtered count
        filtered: usize,
        /// Dropped count
        dropped: usize,
        /// Abandoned count
        abandoned: usize,
    },
}
