//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\sonic-engine\config.toml
//! - macOS: ~/Library/Application Support/sonic-engine/config.toml
//! - Linux: ~/.config/sonic-engine/config.toml
//!
//! The config file is human-readable and editable. Every section is
//! optional; missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::player::{LoopMode, ReplayGainMode, ShuffleInsertPolicy};
use crate::server::TranscodeSettings;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Streaming server connection
    pub server: ServerConfig,

    /// Playback behavior
    pub playback: PlaybackConfig,

    /// Play count reporting
    pub scrobbling: ScrobbleConfig,

    /// Stream format requests
    pub transcoding: TranscodingConfig,

    /// Loudness normalization
    pub replay_gain: ReplayGainConfig,

    /// Local audio file cache
    pub cache: CacheConfig,
}

/// Subsonic server connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL, e.g. "https://music.example.com"
    pub url: String,

    pub username: String,

    /// Stored in plain text; the file should only be readable by the user
    pub password: String,

    /// Identifier stored with saved play queues
    pub id: String,
}

impl ServerConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.username.is_empty()
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Loop mode at startup: "None", "All" or "One"
    pub repeat_mode: LoopMode,

    /// Poll the play position faster for a smoother waveform seekbar
    pub use_waveform_seekbar: bool,

    /// Volume at startup (0 - 100)
    pub volume: u8,

    /// Where "play next" lands in canonical order while shuffled
    pub shuffle_insert_policy: ShuffleInsertPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            repeat_mode: LoopMode::None,
            use_waveform_seekbar: false,
            volume: 100,
            shuffle_insert_policy: ShuffleInsertPolicy::FollowCurrent,
        }
    }
}

/// Scrobble settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrobbleConfig {
    pub enabled: bool,

    /// Seconds of listening that count as a play (negative disables the
    /// time threshold)
    pub threshold_time_seconds: i32,

    /// Percent of the track that counts as a play
    pub threshold_percent: u8,
}

impl Default for ScrobbleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_time_seconds: 240,
            threshold_percent: 50,
        }
    }
}

/// Transcoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingConfig {
    pub request_transcode: bool,

    /// Target codec when transcoding, e.g. "opus" or "mp3"
    pub codec: String,

    pub max_bit_rate_kbps: u32,

    /// Always ask for the original file (overrides transcoding)
    pub force_raw_file: bool,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            request_transcode: false,
            codec: "opus".to_string(),
            max_bit_rate_kbps: 160,
            force_raw_file: false,
        }
    }
}

impl TranscodingConfig {
    /// Settings to attach to stream URLs, if transcoding is requested.
    pub fn settings(&self) -> Option<TranscodeSettings> {
        self.request_transcode.then(|| TranscodeSettings {
            codec: self.codec.clone(),
            max_bit_rate_kbps: self.max_bit_rate_kbps,
        })
    }
}

/// ReplayGain mode as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplayGainSetting {
    /// Album gain when a whole album is played, track gain otherwise
    Auto,
    None,
    #[default]
    Track,
    Album,
}

impl From<ReplayGainSetting> for ReplayGainMode {
    fn from(setting: ReplayGainSetting) -> Self {
        match setting {
            ReplayGainSetting::Auto | ReplayGainSetting::Track => ReplayGainMode::Track,
            ReplayGainSetting::None => ReplayGainMode::None,
            ReplayGainSetting::Album => ReplayGainMode::Album,
        }
    }
}

/// ReplayGain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayGainConfig {
    pub mode: ReplayGainSetting,
    pub preamp_gain_db: f64,
    pub prevent_clipping: bool,
}

impl Default for ReplayGainConfig {
    fn default() -> Self {
        Self {
            mode: ReplayGainSetting::Track,
            preamp_gain_db: 0.0,
            prevent_clipping: true,
        }
    }
}

/// Audio cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Override the cache location (default: user cache directory)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sonic-engine"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default location of the saved play queue
pub fn saved_queue_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("saved_queue.json"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!(target: "config", "Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", "No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(target: "config", "Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!(target: "config", "Failed to parse config file {:?}: {}", path, e);
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", "Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to a file
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", "Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
