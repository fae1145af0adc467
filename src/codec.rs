//! Media codec seam: audio slices and still frames
//!
//! Decode/encode internals are out of scope; the segmenter only needs a
//! time-bounded audio slice and a single frame at a timestamp.

use crate::error::{Error, Result};
use crate::utils::{remove_path, resolve_binary, run_tool};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Audio/video extraction backend
///
/// Implementations signal failure when the timestamp is out of range or the
/// source media is unreadable.
#[async_trait]
pub trait MediaCodec: Send + Sync {
    /// Write the audio in `[start_ms, end_ms)` of `source` to `output`
    async fn extract_audio(
        &self,
        source: &Path,
        start_ms: u64,
        end_ms: u64,
        output: &Path,
    ) -> Result<()>;

    /// Write the video frame at `at_ms` of `source` to `output`
    async fn capture_frame(&self, source: &Path, at_ms: u64, output: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Codec backed by the external `ffmpeg` binary
///
/// Audio slices are written as 16-bit PCM WAV, frames as PNG.
pub struct FfmpegCodec {
    binary_path: PathBuf,
}

impl FfmpegCodec {
    /// Create a codec with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Resolve ffmpeg from an optional explicit path
    pub fn resolve(explicit: Option<&Path>, search_path: bool) -> Result<Self> {
        resolve_binary("ffmpeg", explicit, search_path).map(Self::new)
    }
}

fn seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[async_trait]
impl MediaCodec for FfmpegCodec {
    async fn extract_audio(
        &self,
        source: &Path,
        start_ms: u64,
        end_ms: u64,
        output: &Path,
    ) -> Result<()> {
        if end_ms <= start_ms {
            return Err(Error::Other(format!(
                "empty audio range {}-{} ms",
                start_ms, end_ms
            )));
        }
        let duration = seconds(end_ms - start_ms);
        let start = seconds(start_ms);
        let args: Vec<&std::ffi::OsStr> = vec![
            "-nostdin".as_ref(),
            "-y".as_ref(),
            "-ss".as_ref(),
            start.as_ref(),
            "-i".as_ref(),
            source.as_os_str(),
            "-t".as_ref(),
            duration.as_ref(),
            "-vn".as_ref(),
            "-c:a".as_ref(),
            "pcm_s16le".as_ref(),
            output.as_os_str(),
        ];
        remove_path(output).await?;
        run_tool("ffmpeg", &self.binary_path, args).await?;
        ensure_written(output, start_ms).await
    }

    async fn capture_frame(&self, source: &Path, at_ms: u64, output: &Path) -> Result<()> {
        let at = seconds(at_ms);
        let args: Vec<&std::ffi::OsStr> = vec![
            "-nostdin".as_ref(),
            "-y".as_ref(),
            "-ss".as_ref(),
            at.as_ref(),
            "-i".as_ref(),
            source.as_os_str(),
            "-frames:v".as_ref(),
            "1".as_ref(),
            output.as_os_str(),
        ];
        remove_path(output).await?;
        run_tool("ffmpeg", &self.binary_path, args).await?;
        ensure_written(output, at_ms).await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

// ffmpeg exits 0 when seeking past the end but writes nothing; callers
// clear `output` before running it
async fn ensure_written(output: &Path, at_ms: u64) -> Result<()> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(Error::ExternalTool(format!(
            "ffmpeg produced no output at {} ms (timestamp out of range?)",
            at_ms
        ))),
    }
}
