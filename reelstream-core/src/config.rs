use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::quality::{QualityProfile, QualityProfileCatalog};

/// Hard ceiling on simultaneous codec processes, whatever the config asks for.
pub const MAX_ENCODE_WORKERS: usize = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReelstreamConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    #[serde(default)]
    pub transcode: TranscodeSection,
    #[serde(default)]
    pub streaming: StreamingSection,
    #[serde(default)]
    pub profiles: Vec<QualityProfile>,
    #[serde(default)]
    pub legacy_overrides: Vec<LegacyOverrideEntry>,
}

impl ReelstreamConfig {
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.data_dir)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.storage_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.logs_dir)
    }

    /// Profiles from `[[profiles]]`, or the stock 360p/720p/1080p ladder when
    /// the section is absent.
    pub fn quality_catalog(&self) -> Result<QualityProfileCatalog> {
        if self.profiles.is_empty() {
            return Ok(QualityProfileCatalog::default());
        }
        QualityProfileCatalog::new(self.profiles.clone()).map_err(|err| ConfigError::Invalid {
            field: "profiles".to_string(),
            reason: err.to_string(),
        })
    }

    pub fn encode_workers(&self) -> usize {
        self.transcode
            .max_concurrent_encodes
            .clamp(1, MAX_ENCODE_WORKERS)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub storage_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeSection {
    pub max_concurrent_encodes: usize,
    pub container: String,
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    pub encode_timeout_seconds: Option<u64>,
    pub audio_bitrate_kbps: u32,
    pub preset: String,
}

impl Default for TranscodeSection {
    fn default() -> Self {
        Self {
            max_concurrent_encodes: 2,
            container: "mp4".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            encode_timeout_seconds: None,
            audio_bitrate_kbps: 128,
            preset: "veryfast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingSection {
    pub public_prefix: String,
    pub api_prefix: String,
    pub probe_extensions: Vec<String>,
    pub default_quality: String,
    pub preference_order: Vec<String>,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            public_prefix: "/videos/stream".to_string(),
            api_prefix: "/api".to_string(),
            probe_extensions: vec!["mp4".to_string(), "webm".to_string(), "mkv".to_string()],
            default_quality: "720p".to_string(),
            preference_order: vec!["1080p".to_string(), "720p".to_string(), "360p".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LegacyOverrideEntry {
    pub movie_id: String,
    pub url_template: String,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ReelstreamConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    ReelstreamConfig::from_toml_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
