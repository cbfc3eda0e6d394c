//! Configuration file for ~/.config/gather/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Besides user settings it records the logged-in user, so commands that
//! change the session write it back with [`Config::save`].
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};

/// Overrides the config file location
pub const CONFIG_ENV_VAR: &str = "GATHER_CONFIG";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "gather.db";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Cannot locate config directory: set GATHER_CONFIG, XDG_CONFIG_HOME or HOME")]
    NoHome,

    #[error("Invalid interval {0}")]
    InvalidInterval(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gather.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// User that session-bound commands act as.
    pub current_user_name: Option<String>,

    /// Client header sent with every feed request.
    pub user_agent: String,

    /// Per-request timeout for feed fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = [
        "database_path",
        "current_user_name",
        "user_agent",
        "fetch_timeout_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories.
    ///
    /// Writes to a temporary sibling and renames it over the target, so the
    /// file is never left half-written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }
        Ok(())
    }

    /// The database file, relative to `config_path` unless configured.
    pub fn resolve_database_path(&self, config_path: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DATABASE_FILE_NAME),
        }
    }

    /// Fetch timeout; a configured `0` falls back to the default.
    pub fn fetch_timeout(&self) -> Duration {
        if self.fetch_timeout_secs == 0 {
            tracing::warn!(
                default_secs = DEFAULT_FETCH_TIMEOUT.as_secs(),
                "fetch_timeout_secs = 0 would fail every fetch, using the default"
            );
            return DEFAULT_FETCH_TIMEOUT;
        }
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Locate the config file.
///
/// `GATHER_CONFIG` wins, then `$XDG_CONFIG_HOME/gather/config.toml`, then
/// `$HOME/.config/gather/config.toml`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty());

    if let Some(path) = var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    if let Some(xdg) = var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("gather").join(CONFIG_FILE_NAME));
    }
    let home = var("HOME").ok_or(ConfigError::NoHome)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("gather")
        .join(CONFIG_FILE_NAME))
}

// ============================================================================
// Tests
// ============================================================================
