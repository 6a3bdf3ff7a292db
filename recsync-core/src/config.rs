use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecsyncConfig {
    pub connection: ConnectionSection,
    pub sync: SyncSection,
    pub paths: PathsSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub transcode: TranscodeSection,
}

impl RecsyncConfig {
    /// Range checks the host UI would normally enforce before handing the
    /// values over.
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.sync.scan_interval_minutes) {
            return Err(ConfigError::Invalid {
                field: "sync.scan_interval_minutes",
                reason: format!(
                    "{} is outside the 1..=60 minute range",
                    self.sync.scan_interval_minutes
                ),
            });
        }
        if !(5..=300).contains(&self.sync.upload_delay_seconds) {
            return Err(ConfigError::Invalid {
                field: "sync.upload_delay_seconds",
                reason: format!(
                    "{} is outside the 5..=300 second range",
                    self.sync.upload_delay_seconds
                ),
            });
        }
        if self.connection.base_url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.storage_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSection {
    /// Upstream host base URL, e.g. "http://localhost:8123".
    pub base_url: String,
    /// Bearer token supplied by the host; never minted here.
    pub access_token: String,
    /// Entity used for catalog browse calls.
    #[serde(default = "default_browse_entity")]
    pub browse_entity: String,
}

fn default_browse_entity() -> String {
    "media_player.recsync_browser".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: u64,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default)]
    pub snapshot_format: SnapshotFormat,
    #[serde(default = "default_upload_delay")]
    pub upload_delay_seconds: u64,
}

fn default_scan_interval() -> u64 {
    15
}

fn default_upload_delay() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Root under which recordings/ and metadata/ live.
    pub storage_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            exchange_timeout_secs: default_exchange_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_exchange_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscodeSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "default_clip_seconds")]
    pub clip_seconds: u32,
    #[serde(default = "default_clip_fps")]
    pub clip_fps: u32,
    #[serde(default = "default_clip_width")]
    pub clip_width: u32,
    #[serde(default = "default_transcode_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscodeSection {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            clip_seconds: default_clip_seconds(),
            clip_fps: default_clip_fps(),
            clip_width: default_clip_width(),
            timeout_secs: default_transcode_timeout(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_clip_seconds() -> u32 {
    3
}

fn default_clip_fps() -> u32 {
    5
}

fn default_clip_width() -> u32 {
    320
}

fn default_transcode_timeout() -> u64 {
    120
}

/// Which derived preview assets a cycle produces for each camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    Still,
    Animated,
    Both,
}

impl Default for SnapshotFormat {
    fn default() -> Self {
        SnapshotFormat::Both
    }
}

impl SnapshotFormat {
    pub fn wants_still(self) -> bool {
        matches!(self, SnapshotFormat::Still | SnapshotFormat::Both)
    }

    pub fn wants_animated(self) -> bool {
        matches!(self, SnapshotFormat::Animated | SnapshotFormat::Both)
    }
}

pub fn load_recsync_config<P: AsRef<Path>>(path: P) -> Result<RecsyncConfig> {
    let config: RecsyncConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
