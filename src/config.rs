//! Configuration file parser for ~/.config/factfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gateway::{UploadOptions, FACTS_TABLE, IMAGE_CONTAINER};
use crate::storage::DEFAULT_PUBLIC_URL_BASE;

/// Environment variable that overrides `api_key`.
pub const API_KEY_ENV: &str = "FACTFEED_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("backend = \"rest\" requires store_url")]
    MissingStoreUrl,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which [`crate::gateway::Gateway`] implementation backs the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Remote table and object storage API over HTTPS.
    Rest,
    /// Local SQLite file.
    #[default]
    Sqlite,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,

    /// Base URL of the remote store (REST backend only).
    pub store_url: Option<String>,

    /// Store API key (alternative to the FACTFEED_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Facts table name.
    pub table: String,

    /// Blob container for fact images.
    pub image_container: String,

    /// Cache lifetime of uploaded images, in seconds.
    pub cache_control: String,

    /// Per-request timeout in seconds. 0 = no timeout.
    pub request_timeout_secs: u64,

    /// SQLite database file. Defaults to `factfeed.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Prefix of image URLs handed out by the SQLite blob table.
    pub public_url_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            store_url: None,
            api_key: None,
            table: FACTS_TABLE.to_string(),
            image_container: IMAGE_CONTAINER.to_string(),
            cache_control: UploadOptions::default().cache_control,
            request_timeout_secs: 30,
            database_path: None,
            public_url_base: DEFAULT_PUBLIC_URL_BASE.to_string(),
        }
    }
}

/// SEC-015: Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("store_url", &self.store_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("table", &self.table)
            .field("image_container", &self.image_container)
            .field("cache_control", &self.cache_control)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("database_path", &self.database_path)
            .field("public_url_base", &self.public_url_base)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "backend",
        "store_url",
        "api_key",
        "table",
        "image_container",
        "cache_control",
        "request_timeout_secs",
        "database_path",
        "public_url_base",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
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
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
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

        let config: Config = toml::from_str(content)?;
        tracing::info!(path = %path.display(), backend = ?config.backend, "Loaded configuration");
        Ok(config)
    }

    /// The store API key: `FACTFEED_API_KEY` if set and non-empty, else the
    /// config file value.
    pub fn api_key(&self) -> Option<SecretString> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }

    /// Store URL, required by the REST backend.
    pub fn store_url(&self) -> Result<&str, ConfigError> {
        self.store_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingStoreUrl)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            cache_control: self.cache_control.clone(),
            overwrite: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
