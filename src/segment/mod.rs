//! Caption-driven segmentation of a fetched item
//!
//! The segmenter parses the chosen caption track into cues and, for every
//! cue with more than [`MIN_SEGMENT_WORDS`] words, asks the [`MediaCodec`]
//! for an audio slice and two still frames (start and midpoint). Any codec
//! failure aborts the whole item. Only when every artifact is on disk is the
//! content descriptor persisted and the `_SUCCESS` sentinel created, in that
//! order.

mod captions;

pub use captions::{MIN_CUE_CHARS, SubtitleCue, collapse_text, parse_captions, parse_timestamp};

use crate::codec::MediaCodec;
use crate::error::SegmentationError;
use crate::types::{FetchedMedia, ItemMetadata};
use crate::unit;
use crate::utils::partial_name;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Cues with this many words or fewer produce no segment
pub const MIN_SEGMENT_WORDS: usize = 3;

/// One cue with its artifact file names (relative to the unit directory)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSegment {
    /// Cue start in milliseconds
    pub start_timestamp: u64,
    /// Cue end in milliseconds
    pub end_timestamp: u64,
    /// Cue text
    pub subtitle_text: String,
    /// Audio slice file name
    pub audio_segment: String,
    /// Still frame file names, start frame first
    pub video_captures: Vec<String>,
}

/// JSON content descriptor persisted as `<id>.contents.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    /// Item identity
    pub id: String,
    /// Item title
    pub title: String,
    /// Caption language the segments were cut from
    pub lang: String,
    /// Media duration in whole seconds, when known
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Segments in caption order
    pub contents: Vec<ContentSegment>,
}

/// Audio slice file name
pub fn audio_artifact_name(item_id: &str, start_ms: u64, end_ms: u64) -> String {
    format!("{}.audio.{:08}-{:08}.wav", item_id, start_ms, end_ms)
}

/// Still frame file name
pub fn frame_artifact_name(item_id: &str, at_ms: u64) -> String {
    format!("{}.video.{:08}.png", item_id, at_ms)
}

/// Turns a fetched item into segments, a descriptor and a sentinel
pub struct ContentSegmenter {
    codec: Arc<dyn MediaCodec>,
}

impl ContentSegmenter {
    /// Create a segmenter using `codec` for every slice and frame
    pub fn new(codec: Arc<dyn MediaCodec>) -> Self {
        Self { codec }
    }

    /// Segment one item into `unit_dir`
    ///
    /// On success the descriptor and the sentinel exist in `unit_dir`. On
    /// failure neither was written; artifacts already cut stay behind and are
    /// overwritten by the next attempt.
    pub async fn segment(
        &self,
        item: &ItemMetadata,
        language: &str,
        media: &FetchedMedia,
        unit_dir: &Path,
    ) -> Result<ContentDescriptor, SegmentationError> {
        let track = tokio::fs::read(&media.caption_path).await.map_err(|e| {
            SegmentationError::CaptionTrack {
                path: media.caption_path.clone(),
                reason: e.to_string(),
            }
        })?;
        let cues = parse_captions(&String::from_utf8_lossy(&track));

        let mut contents = Vec::with_capacity(cues.len());
        for cue in &cues {
            if cue.word_count() <= MIN_SEGMENT_WORDS {
                debug!(unit = %item.id, start_ms = cue.start_ms, "cue too short, skipping");
                continue;
            }
            contents.push(self.cut(item, media, cue, unit_dir).await?);
        }

        let descriptor = ContentDescriptor {
            id: item.id.clone(),
            title: item.title.clone(),
            lang: language.to_string(),
            duration_secs: item.duration_secs,
            contents,
        };
        persist(&descriptor, unit_dir).await?;

        info!(
            unit = %item.id,
            cues = cues.len(),
            segments = descriptor.contents.len(),
            "item segmented"
        );
        Ok(descriptor)
    }

    async fn cut(
        &self,
        item: &ItemMetadata,
        media: &FetchedMedia,
        cue: &SubtitleCue,
        unit_dir: &Path,
    ) -> Result<ContentSegment, SegmentationError> {
        let audio_name = audio_artifact_name(&item.id, cue.start_ms, cue.end_ms);
        self.codec
            .extract_audio(
                &media.audio_source,
                cue.start_ms,
                cue.end_ms,
                &unit_dir.join(&audio_name),
            )
            .await
            .map_err(|e| SegmentationError::AudioSlice {
                start_ms: cue.start_ms,
                end_ms: cue.end_ms,
                reason: e.to_string(),
            })?;

        let mut captures = vec![cue.start_ms];
        let midpoint = cue.midpoint_ms();
        if midpoint != cue.start_ms {
            captures.push(midpoint);
        }

        let mut video_captures = Vec::with_capacity(captures.len());
        for at_ms in captures {
            let frame_name = frame_artifact_name(&item.id, at_ms);
            self.codec
                .capture_frame(&media.video_source, at_ms, &unit_dir.join(&frame_name))
                .await
                .map_err(|e| SegmentationError::FrameCapture {
                    at_ms,
                    reason: e.to_string(),
                })?;
            video_captures.push(frame_name);
        }

        Ok(ContentSegment {
            start_timestamp: cue.start_ms,
            end_timestamp: cue.end_ms,
            subtitle_text: cue.text.clone(),
            audio_segment: audio_name,
            video_captures,
        })
    }
}

/// Write the descriptor under a temporary name, rename it, then create the sentinel
async fn persist(descriptor: &ContentDescriptor, unit_dir: &Path) -> Result<(), SegmentationError> {
    let path = unit::descriptor_path(unit_dir, &descriptor.id);
    let persist_err = |path: &Path, reason: String| SegmentationError::Persist {
        path: path.to_path_buf(),
        reason,
    };

    let json = serde_json::to_vec_pretty(descriptor).map_err(|e| persist_err(&path, e.to_string()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = unit_dir.join(partial_name(&file_name));
    tokio::fs::write(&temp, json)
        .await
        .map_err(|e| persist_err(&temp, e.to_string()))?;
    tokio::fs::rename(&temp, &path)
        .await
        .map_err(|e| persist_err(&path, e.to_string()))?;

    unit::write_sentinel(unit_dir)
        .await
        .map_err(|e| persist_err(&unit_dir.join(unit::SENTINEL_FILE), e.to_string()))
}

#[cfg(test)]
mod tests;
