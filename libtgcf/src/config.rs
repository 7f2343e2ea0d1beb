//! Configuration management for TGCF
//!
//! The configuration is a TOML file. The random reposter reads the `[live]`
//! section and the `[[forwards]]` table; every value is bounds-checked when the
//! file is loaded and again before it is written back.

use serde::{Deserialize, Serialize};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::plugins::Plugin;

pub const MIN_RANDOM_DELAY: u64 = 60;
pub const MAX_RANDOM_DELAY: u64 = 86_400;
pub const MIN_RANDOM_COUNT: u32 = 1;
pub const MAX_RANDOM_COUNT: u32 = 50;
pub const MIN_HISTORY_CAPACITY: usize = 4;
pub const MAX_FETCH_WINDOW: u32 = 1000;

/// Upper bound of the derived fetch window
const DEFAULT_WINDOW_CAP: u32 = 300;
/// Candidates fetched per requested message when no window is configured
const WINDOW_PER_MESSAGE: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(
        default,
        serialize_with = "serialize_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_token: Option<SecretString>,
    /// History exports (Telegram Desktop `result.json`) per source chat
    #[serde(default)]
    pub archives: Vec<ArchiveConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub source: i64,
    pub path: String,
}

/// Live-mode random reposting options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default)]
    pub random_enabled: bool,
    /// Seconds between batches
    #[serde(default = "default_random_delay")]
    pub random_delay: u64,
    /// Messages per batch
    #[serde(default = "default_random_count")]
    pub random_count: u32,
    /// Messages per source per UTC day, 0 for unlimited
    #[serde(default)]
    pub random_total_limit: u32,
    #[serde(default)]
    pub random_active_sources: Vec<i64>,
    #[serde(default = "default_history_capacity")]
    pub random_history_capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_fetch_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_max_text_length: Option<usize>,
    #[serde(default = "default_random_marker")]
    pub random_marker: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            random_enabled: false,
            random_delay: default_random_delay(),
            random_count: default_random_count(),
            random_total_limit: 0,
            random_active_sources: Vec::new(),
            random_history_capacity: default_history_capacity(),
            random_fetch_window: None,
            random_max_text_length: None,
            random_marker: default_random_marker(),
        }
    }
}

/// A source chat and the destinations its messages go to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub source: i64,
    pub dests: Vec<i64>,
    #[serde(default = "default_true")]
    pub use_this: bool,
}

fn default_random_delay() -> u64 {
    300
}

fn default_random_count() -> u32 {
    1
}

fn default_history_capacity() -> usize {
    500
}

fn default_random_marker() -> String {
    "\n\n🔀 Random from archive".to_string()
}

fn default_true() -> bool {
    true
}

fn serialize_secret<S>(secret: &Option<SecretString>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Everything one source's scheduler needs, fixed for the task's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub source: i64,
    pub enabled: bool,
    pub delay: Duration,
    pub batch_size: u32,
    /// 0 means unlimited
    pub daily_limit: u32,
    pub destinations: Vec<i64>,
    pub fetch_window: u32,
    pub max_text_length: Option<usize>,
}

impl SourceConfig {
    /// Build a source config from the live settings, validating the bounds
    pub fn new(source: i64, destinations: Vec<i64>, live: &LiveConfig) -> Result<Self> {
        live.validate()?;
        Ok(Self {
            source,
            enabled: live.random_enabled,
            delay: Duration::from_secs(live.random_delay),
            batch_size: live.random_count,
            daily_limit: live.random_total_limit,
            destinations,
            fetch_window: live.fetch_window(),
            max_text_length: live.random_max_text_length,
        })
    }
}

impl LiveConfig {
    /// How many recent messages to pull per cycle
    pub fn fetch_window(&self) -> u32 {
        self.random_fetch_window.unwrap_or_else(|| {
            DEFAULT_WINDOW_CAP.min(self.random_count.saturating_mul(WINDOW_PER_MESSAGE))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_RANDOM_DELAY..=MAX_RANDOM_DELAY).contains(&self.random_delay) {
            return Err(ConfigError::Invalid(format!(
                "live.random_delay must be within [{}, {}] seconds, got {}",
                MIN_RANDOM_DELAY, MAX_RANDOM_DELAY, self.random_delay
            ))
            .into());
        }

        if !(MIN_RANDOM_COUNT..=MAX_RANDOM_COUNT).contains(&self.random_count) {
            return Err(ConfigError::Invalid(format!(
                "live.random_count must be within [{}, {}], got {}",
                MIN_RANDOM_COUNT, MAX_RANDOM_COUNT, self.random_count
            ))
            .into());
        }

        if self.random_history_capacity < MIN_HISTORY_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "live.random_history_capacity must be at least {}, got {}",
                MIN_HISTORY_CAPACITY, self.random_history_capacity
            ))
            .into());
        }

        if let Some(window) = self.random_fetch_window {
            if !(1..=MAX_FETCH_WINDOW).contains(&window) {
                return Err(ConfigError::Invalid(format!(
                    "live.random_fetch_window must be within [1, {}], got {}",
                    MAX_FETCH_WINDOW, window
                ))
                .into());
            }
        }

        if self.random_max_text_length == Some(0) {
            return Err(ConfigError::Invalid(
                "live.random_max_text_length must be positive".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// `TGCF_DB_PATH` overrides `database.path` when set.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;

        if let Ok(db_path) = std::env::var("TGCF_DB_PATH") {
            config.database.path = db_path;
        }

        Ok(config)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and write configuration. Invalid values never reach disk.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
        }
        std::fs::write(path, content).map_err(ConfigError::ReadError)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }

        self.live.validate()?;

        let mut seen = HashSet::new();
        for forward in &self.forwards {
            if !seen.insert(forward.source) {
                return Err(ConfigError::Invalid(format!(
                    "source {} appears in more than one forward",
                    forward.source
                ))
                .into());
            }
        }

        for plugin in &self.plugins {
            plugin.validate()?;
        }

        Ok(())
    }

    /// Destinations configured for `source`, if the forward is in use
    pub fn destinations(&self, source: i64) -> Option<&[i64]> {
        self.forwards
            .iter()
            .find(|f| f.source == source && f.use_this)
            .map(|f| f.dests.as_slice())
    }

    /// One `SourceConfig` per active random source that has a usable forward
    ///
    /// Active sources without a forward, or with no destinations, are skipped
    /// with a warning.
    pub fn source_configs(&self) -> Result<Vec<SourceConfig>> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();

        for &source in &self.live.random_active_sources {
            if !seen.insert(source) {
                continue;
            }

            match self.destinations(source) {
                Some(dests) if !dests.is_empty() => {
                    sources.push(SourceConfig::new(source, dests.to_vec(), &self.live)?);
                }
                Some(_) => warn!(source, "source has no destinations, skipping random posting"),
                None => warn!(source, "source not found in configured forwards"),
            }
        }

        Ok(sources)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/tgcf/tgcf.db".to_string(),
            },
            telegram: TelegramConfig::default(),
            live: LiveConfig::default(),
            forwards: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TGCF_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("tgcf").join("config.toml"))
}
