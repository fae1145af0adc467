//! Content fetching seam: metadata probe and media download
//!
//! The platform extraction mechanics are opaque. A fetcher answers two
//! questions: which caption languages does an item offer (probe, nothing
//! downloaded), and where did the media and caption files land (fetch).

use crate::error::{Error, Result};
use crate::types::{FetchedMedia, ItemMetadata};
use crate::utils::{resolve_binary, run_tool};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Metadata probe and media download backend
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Probe metadata only, downloading nothing
    async fn probe(&self, url: &str) -> Result<ItemMetadata>;

    /// Download media and the caption track in `language` into `unit_dir`
    async fn fetch(&self, item: &ItemMetadata, language: &str, unit_dir: &Path)
    -> Result<FetchedMedia>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Fetcher backed by the external `yt-dlp` binary
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    format: String,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path and format selector
    pub fn new(binary_path: PathBuf, format: impl Into<String>) -> Self {
        Self {
            binary_path,
            format: format.into(),
        }
    }

    /// Resolve yt-dlp from an optional explicit path
    pub fn resolve(explicit: Option<&Path>, search_path: bool, format: &str) -> Result<Self> {
        resolve_binary("yt-dlp", explicit, search_path).map(|path| Self::new(path, format))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeJson {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    subtitles: Option<HashMap<String, serde_json::Value>>,
}

/// Turn `yt-dlp --dump-single-json` output into item metadata
pub(crate) fn parse_probe_output(url: &str, stdout: &[u8]) -> Result<ItemMetadata> {
    let probe: ProbeJson = serde_json::from_slice(stdout)
        .map_err(|e| Error::Fetch(format!("unparseable probe output for {}: {}", url, e)))?;
    let caption_languages: BTreeSet<String> = probe
        .subtitles
        .map(|subs| subs.into_keys().collect())
        .unwrap_or_default();
    Ok(ItemMetadata {
        title: probe.title.unwrap_or_else(|| probe.id.clone()),
        url: probe.webpage_url.unwrap_or_else(|| url.to_string()),
        duration_secs: probe.duration.filter(|d| d.is_finite() && *d >= 0.0).map(|d| d as u64),
        id: probe.id,
        caption_languages,
    })
}

/// Find the downloaded media file `<id>.<ext>` next to the captions
async fn find_media_file(unit_dir: &Path, item_id: &str) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(unit_dir).await?;
    let prefix = format!("{}.", item_id);
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(ext) = name.strip_prefix(&prefix) else { continue };
        // Captions and metadata carry a second dot (`<id>.<lang>.vtt`, `<id>.info.json`)
        if !ext.is_empty() && !ext.contains('.') && !matches!(ext, "part" | "ytdl" | "vtt") {
            return Ok(entry.path());
        }
    }
    Err(Error::Fetch(format!(
        "no media file for {} in {}",
        item_id,
        unit_dir.display()
    )))
}

#[async_trait]
impl ContentFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<ItemMetadata> {
        let output = run_tool(
            "yt-dlp",
            &self.binary_path,
            ["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings", url],
        )
        .await
        .map_err(|e| Error::Fetch(format!("probe of {} failed: {}", url, e)))?;
        parse_probe_output(url, &output.stdout)
    }

    async fn fetch(
        &self,
        item: &ItemMetadata,
        language: &str,
        unit_dir: &Path,
    ) -> Result<FetchedMedia> {
        tokio::fs::create_dir_all(unit_dir).await?;
        let template = unit_dir.join(format!("{}.%(ext)s", item.id));
        let template = template.to_string_lossy().into_owned();
        run_tool(
            "yt-dlp",
            &self.binary_path,
            [
                "--no-playlist",
                "--no-warnings",
                "--no-overwrites",
                "-f",
                self.format.as_str(),
                "--write-subs",
                "--sub-langs",
                language,
                "--sub-format",
                "vtt",
                "-o",
                template.as_str(),
                item.url.as_str(),
            ],
        )
        .await
        .map_err(|e| Error::Fetch(format!("download of {} failed: {}", item.url, e)))?;

        let caption_path = unit_dir.join(format!("{}.{}.vtt", item.id, language));
        if !tokio::fs::try_exists(&caption_path).await.unwrap_or(false) {
            return Err(Error::Fetch(format!(
                "caption track {} missing after download",
                caption_path.display()
            )));
        }
        let media = find_media_file(unit_dir, &item.id).await?;
        Ok(FetchedMedia {
            audio_source: media.clone(),
            video_source: media,
            caption_path,
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
