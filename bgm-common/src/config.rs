//! Configuration loading and assets folder resolution
//!
//! Bootstrap configuration comes from a TOML file. A missing file is not an
//! error: the service logs a warning and starts with built-in defaults.
//!
//! Assets folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`BGM_ASSETS_DIR`)
//! 3. TOML config file (`assets_dir`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the assets folder
pub const ASSETS_DIR_ENV: &str = "BGM_ASSETS_DIR";

/// Track played when nothing else is configured
pub const DEFAULT_TRACK: &str = "bgm.mp3";

/// Default bound on queued worker commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Folder containing the music assets (optional)
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,

    /// Track started when the service connects
    #[serde(default = "default_track")]
    pub track: String,

    /// Maximum number of pending worker commands
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Audio output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputConfig {
    /// Discard audio instead of opening a device
    #[serde(default)]
    pub null_output: bool,

    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            track: default_track(),
            queue_capacity: default_queue_capacity(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_track() -> String {
    DEFAULT_TRACK.to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when no file is found
    ///
    /// An explicit path that cannot be read or parsed is an error. Without an
    /// explicit path the platform locations are searched and a missing file
    /// yields the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match find_config_file() {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load_from(&path)
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.track.trim().is_empty() {
            return Err(Error::Config("track must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Playback settings handed from the host to the coordinator
///
/// Carries the track name explicitly rather than through process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgmSettings {
    file_name: String,
}

impl BgmSettings {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
    }
}

impl Default for BgmSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK)
    }
}

impl From<&TomlConfig> for BgmSettings {
    fn from(config: &TomlConfig) -> Self {
        Self::new(config.track.clone())
    }
}

/// Resolve the assets folder following the documented priority order
pub fn resolve_assets_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ASSETS_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.assets_dir {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_assets_dir()
}

/// Search the platform config locations for `bgm/config.toml`
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("bgm").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/bgm/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default assets folder
pub fn default_assets_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bgm").join("assets"))
        .unwrap_or_else(|| PathBuf::from("./bgm_assets"))
}
