//! Bounded retry bookkeeping for failed candidates
//!
//! The dispatcher is the only writer, so the ledger is a plain map with no
//! locking. An item may be re-attempted at most `ceiling` times; the failure
//! observed once the count has reached the ceiling drops it for good.
//!
//! # Example
//!
//! ```
//! use harvest_dl::retry::{RetryDecision, RetryTracker};
//!
//! let mut tracker = RetryTracker::new(1);
//! assert_eq!(tracker.record_failure("u"), RetryDecision::Retry { attempt: 1 });
//! assert_eq!(tracker.record_failure("u"), RetryDecision::Drop { retries: 1 });
//! ```

use std::collections::HashMap;

/// What to do with an item that just failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the item back into a future group; `attempt` is the retry number (1-based)
    Retry {
        /// Retry number
        attempt: u32,
    },
    /// Give up; the item was already retried `retries` times
    Drop {
        /// Retries spent on the item
        retries: u32,
    },
}

/// Retry ledger keyed by item identity
///
/// Lives for one pipeline run.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    ceiling: u32,
    counts: HashMap<String, u32>,
}

impl RetryTracker {
    /// Create a ledger that allows `ceiling` retries per item
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            counts: HashMap::new(),
        }
    }

    /// Configured ceiling
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Retries already granted to an item
    pub fn retries(&self, key: &str) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Record an observed failure and decide whether the item goes around again
    pub fn record_failure(&mut self, key: &str) -> RetryDecision {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        if *count < self.ceiling {
            *count += 1;
            RetryDecision::Retry { attempt: *count }
        } else {
            RetryDecision::Drop { retries: *count }
        }
    }

    /// Number of items with at least one recorded retry
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when no failure has been recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
