use crate::defaults;
use crate::error::{LivesubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub gate: GateConfig,
}

/// HTTP front-end configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory whose `*.html` files are served under their stem.
    pub assets_dir: Option<PathBuf>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Content fingerprint of the selected input device (see `audio::device`).
    /// Empty selects the system default input device.
    pub device_hash: String,
    pub sample_rate: u32,
}

/// Recognition backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Address of the streaming recognition service.
    pub backend_addr: String,
    pub language: String,
}

/// Voice-activity gate thresholds, runtime-mutable as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Amplitude range (max−min, i32) at or above which the gate opens.
    pub onset_volume: i32,
    /// Amplitude range below which a chunk counts as silence once open.
    pub release_volume: i32,
    /// Consecutive silent chunks absorbed before emission is suspended.
    pub pause_frames: u32,
    /// Consecutive silent chunks that close the utterance.
    pub off_frames: u32,
    /// Chunks of pre-roll replayed when an utterance begins.
    pub preactive_frames: usize,
}

/// Partial gate update as accepted by the `/set_config_dict` endpoint.
///
/// Field names follow the wire convention of the front-end (camelCase);
/// only fields present in the payload are replaced.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateConfigPatch {
    pub onset_volume: Option<i32>,
    pub release_volume: Option<i32>,
    pub pause_frames: Option<u32>,
    pub off_frames: Option<u32>,
    pub preactive_frames: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::DEFAULT_PORT,
            assets_dir: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_hash: String::new(),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend_addr: defaults::DEFAULT_BACKEND_ADDR.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            onset_volume: defaults::ONSET_VOLUME,
            release_volume: defaults::RELEASE_VOLUME,
            pause_frames: defaults::PAUSE_FRAMES,
            off_frames: defaults::OFF_FRAMES,
            preactive_frames: defaults::PREACTIVE_FRAMES,
        }
    }
}

impl GateConfig {
    /// Validate the threshold set as a whole.
    ///
    /// The short-gap tolerance must be strictly below the utterance-end
    /// count, otherwise the gate could close before a pause is absorbed.
    pub fn validate(&self) -> Result<()> {
        if self.pause_frames >= self.off_frames {
            return Err(LivesubError::ConfigInvalidValue {
                key: "pause_frames".to_string(),
                message: format!(
                    "must be less than off_frames ({} >= {})",
                    self.pause_frames, self.off_frames
                ),
            });
        }
        Ok(())
    }

    /// Returns a copy with the patch's present fields replaced.
    pub fn merged_with(&self, patch: &GateConfigPatch) -> GateConfig {
        GateConfig {
            onset_volume: patch.onset_volume.unwrap_or(self.onset_volume),
            release_volume: patch.release_volume.unwrap_or(self.release_volume),
            pause_frames: patch.pause_frames.unwrap_or(self.pause_frames),
            off_frames: patch.off_frames.unwrap_or(self.off_frames),
            preactive_frames: patch.preactive_frames.unwrap_or(self.preactive_frames),
        }
    }
}

impl GateConfigPatch {
    /// Parse a patch from a JSON object (the decoded `/set_config_dict` body).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LivesubError::InvalidRequest {
            message: format!("invalid config payload: {}", e),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.gate.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML or invalid thresholds.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(LivesubError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}
