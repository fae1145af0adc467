//! Configuration types for harvest-dl

use crate::error::{Error, Result};
use crate::language::LanguagePolicy;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, str::FromStr, time::Duration};

/// URL schemes that select the distributed-filesystem transfer mode
const DISTRIBUTED_SCHEMES: &[&str] = &["hdfs://", "viewfs://"];

/// Search pagination configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of result pages per query (default: 0 = all pages)
    #[serde(default)]
    pub page_limit: u32,

    /// Only keep candidates whose title contains a CJK ideograph (default: false)
    #[serde(default)]
    pub require_cjk_title: bool,
}

/// Download behavior configuration (output root, concurrency, retry, language policy)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Local output root holding one directory per item (default: "outputs/<YYYYMMDD>")
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Worker pool width (default: 1)
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Number of candidate URLs per download group (default: 5)
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Maximum number of re-attempts for a failed item (default: 3)
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Caption languages of which at least one must be available
    #[serde(default)]
    pub must_languages: Vec<String>,

    /// Additional acceptable caption languages
    #[serde(default)]
    pub choice_languages: Vec<String>,

    /// Per-item time limit for probe + fetch + segmentation (None = unlimited)
    #[serde(default, with = "optional_duration_serde")]
    pub item_timeout: Option<Duration>,

    /// How long to wait for in-flight groups after cancellation (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Treat items whose unit directory already holds a sentinel as succeeded (default: true)
    #[serde(default = "default_true")]
    pub skip_completed: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            parallel: default_parallel(),
            group_size: default_group_size(),
            retry_ceiling: default_retry_ceiling(),
            must_languages: Vec::new(),
            choice_languages: Vec::new(),
            item_timeout: None,
            shutdown_timeout: default_shutdown_timeout(),
            skip_completed: true,
        }
    }
}

/// Archive daemon configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Transfer completed units (default: true). When false the daemon only keeps statistics.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Destination store. `hdfs://`/`viewfs://` selects distributed transfer, a plain
    /// path selects a local move, absent or equal to the output root selects statistics.
    #[serde(default)]
    pub destination: Option<String>,

    /// Packaging mode used for each unit (default: tar)
    #[serde(default)]
    pub pack_mode: PackMode,

    /// Seconds between archive cycles (default: 60)
    #[serde(default = "default_sync_interval", with = "duration_serde")]
    pub sync_interval: Duration,

    /// Delete the local unit after a successful transfer instead of marking it (default: true)
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Run one last cycle when the daemon is stopped after a full harvest (default: true)
    #[serde(default = "default_true")]
    pub final_sweep: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: None,
            pack_mode: PackMode::default(),
            sync_interval: default_sync_interval(),
            clean: true,
            final_sweep: true,
        }
    }
}

/// External tool paths (tar, hadoop, ffmpeg, yt-dlp)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to tar executable (auto-detected if None)
    #[serde(default)]
    pub tar_path: Option<PathBuf>,

    /// Path to hadoop executable (auto-detected if None)
    #[serde(default)]
    pub hadoop_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// yt-dlp format selector for media downloads
    #[serde(default = "default_media_format")]
    pub media_format: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tar_path: None,
            hadoop_path: None,
            ffmpeg_path: None,
            ytdlp_path: None,
            search_path: true,
            media_format: default_media_format(),
        }
    }
}

/// Main configuration for a harvest run
///
/// Fields are organized into logical sub-configs:
/// - [`search`](SearchConfig): pagination and title filtering
/// - [`download`](DownloadConfig): output root, concurrency, retry, language policy
/// - [`archive`](ArchiveConfig): destination, packaging, sync interval
/// - [`tools`](ToolsConfig): external binary paths
///
/// `search`, `download` and `tools` are flattened so the JSON format stays flat;
/// archive settings live under an `archive` key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search pagination settings
    #[serde(flatten)]
    pub search: SearchConfig,

    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Archive daemon settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Output root directory
    pub fn output_root(&self) -> &PathBuf {
        &self.download.output_root
    }

    /// Upper bound on groups in flight (twice the pool width)
    pub fn in_flight_cap(&self) -> usize {
        self.download.parallel.saturating_mul(2)
    }

    /// Build the caption language policy from the must and choice lists
    pub fn language_policy(&self) -> LanguagePolicy {
        LanguagePolicy::new(&self.download.must_languages, &self.download.choice_languages)
    }

    /// Resolve the archive destination
    pub fn destination(&self) -> Result<Destination> {
        if !self.archive.enabled {
            return Ok(Destination::Statistics);
        }
        Destination::parse(self.archive.destination.as_deref(), &self.download.output_root)
    }

    /// Check every option for consistency
    ///
    /// Called by every top-level component before it starts any task.
    pub fn validate(&self) -> Result<()> {
        if self.download.parallel == 0 {
            return Err(Error::config("parallel", "worker pool width must be at least 1"));
        }
        if self.download.group_size == 0 {
            return Err(Error::config("group_size", "group size must be at least 1"));
        }
        if self.archive.sync_interval.is_zero() {
            return Err(Error::config(
                "sync_interval",
                "sync interval must be a positive number of seconds",
            ));
        }
        if self.language_policy().is_empty() {
            return Err(Error::config(
                "must_languages",
                "at least one must or choice caption language is required",
            ));
        }
        if let Some(timeout) = self.download.item_timeout
            && timeout.is_zero()
        {
            return Err(Error::config("item_timeout", "item timeout must be positive"));
        }
        self.destination()?;
        Ok(())
    }
}

/// Packaging mode used when archiving a unit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackMode {
    /// Compress the unit directory into one archive and transfer that (default)
    #[default]
    Tar,
    /// Transfer the unit's files individually
    Raw,
    /// Transfer the unit directory as a whole
    Folder,
}

impl FromStr for PackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tar" => Ok(PackMode::Tar),
            "raw" => Ok(PackMode::Raw),
            "folder" => Ok(PackMode::Folder),
            other => Err(Error::config(
                "pack_mode",
                format!("unknown pack mode `{other}`, expected one of tar, raw, folder"),
            )),
        }
    }
}

impl std::fmt::Display for PackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PackMode::Tar => "tar",
            PackMode::Raw => "raw",
            PackMode::Folder => "folder",
        };
        f.write_str(name)
    }
}

/// Where completed units go
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// No transfer: tally statistics only
    Statistics,
    /// Move into a local directory
    Local(PathBuf),
    /// Upload into a distributed filesystem directory (full URI, trailing `/` removed)
    Distributed(String),
}

impl Destination {
    /// Classify a destination string relative to the output root
    pub fn parse(destination: Option<&str>, output_root: &Path) -> Result<Self> {
        let Some(raw) = destination.map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(Destination::Statistics);
        };

        if let Some(scheme) = DISTRIBUTED_SCHEMES.iter().find(|s| raw.starts_with(**s)) {
            let trimmed = raw.trim_end_matches('/');
            if trimmed.len() <= scheme.len() {
                return Err(Error::config(
                    "destination",
                    format!("distributed destination `{raw}` has no path"),
                ));
            }
            return Ok(Destination::Distributed(trimmed.to_string()));
        }

        let path = PathBuf::from(raw.trim_end_matches('/'));
        if path == output_root {
            return Ok(Destination::Statistics);
        }
        Ok(Destination::Local(path))
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("outputs").join(chrono::Local::now().format("%Y%m%d").to_string())
}

fn default_parallel() -> usize {
    1
}

fn default_group_size() -> usize {
    5
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_media_format() -> String {
    "best[height<=480]/best".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
