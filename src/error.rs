//! Error types for harvest-dl
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] type returned by fallible operations
//! - Domain-specific error types for segmentation and archival transfer
//! - Context information (unit identity, timestamps, paths)
//!
//! Expected outcomes such as "filtered by language policy" are not errors;
//! they are reported through [`crate::types::ItemOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for harvest-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for harvest-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "sync_interval")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Search provider call failed
    #[error("search error: {0}")]
    Search(String),

    /// Metadata probe or media fetch failed
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Caption-to-media segmentation failed
    #[error("segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),

    /// Archive transfer failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// External tool execution failed (tar, hadoop, ffmpeg, yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Segmentation errors
///
/// Any of these aborts segmentation of the whole item: no partial
/// descriptor and no sentinel are written.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// The caption track could not be read
    #[error("caption track {path} unreadable: {reason}")]
    CaptionTrack {
        /// Path of the caption file
        path: PathBuf,
        /// Why it could not be read
        reason: String,
    },

    /// Audio slice extraction failed
    #[error("audio slice {start_ms}-{end_ms} ms failed: {reason}")]
    AudioSlice {
        /// Slice start in milliseconds
        start_ms: u64,
        /// Slice end in milliseconds
        end_ms: u64,
        /// The reason extraction failed
        reason: String,
    },

    /// A required still frame could not be captured
    #[error("frame capture at {at_ms} ms failed: {reason}")]
    FrameCapture {
        /// Capture timestamp in milliseconds
        at_ms: u64,
        /// The reason capture failed
        reason: String,
    },

    /// The content descriptor or sentinel could not be persisted
    #[error("failed to persist {path}: {reason}")]
    Persist {
        /// The file that could not be written
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },
}

/// Archive transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// Packaging the unit into an archive failed
    #[error("packaging unit {unit} failed: {reason}")]
    Pack {
        /// Unit identity
        unit: String,
        /// The reason packaging failed
        reason: String,
    },

    /// Moving or uploading to the destination failed
    #[error("transfer of {path} to {destination} failed: {reason}")]
    Upload {
        /// Local path being transferred
        path: PathBuf,
        /// Destination description
        destination: String,
        /// The reason the transfer failed
        reason: String,
    },

    /// Post-transfer clean or mark step failed
    #[error("finalizing unit {unit} failed: {reason}")]
    Finalize {
        /// Unit identity
        unit: String,
        /// The reason the step failed
        reason: String,
    },
}
