//! `AppConfig` struct and TOML read/write.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use cinedex_core::Preferences;
use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// TMDB endpoint settings.
    #[serde(default)]
    pub tmdb: TmdbConfig,
    /// Persisted user preferences.
    #[serde(default)]
    pub preferences: Preferences,
}

/// TMDB endpoint configuration.
///
/// The API token is never stored here; it comes from `TMDB_API_TOKEN`.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TmdbConfig {
    /// API base URL override (e.g., a local mock server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Minimum spacing between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<u64>,
}

impl TmdbConfig {
    /// Parsed base URL override.
    ///
    /// A trailing slash is added so relative endpoint paths join below it.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn base_url(&self) -> Result<Option<Url>> {
        self.base_url
            .as_deref()
            .map(|raw| {
                let normalized = if raw.ends_with('/') {
                    String::from(raw)
                } else {
                    format!("{raw}/")
                };
                Url::parse(&normalized).with_context(|| format!("invalid tmdb.base_url: {raw}"))
            })
            .transpose()
    }

    /// Minimum request spacing override.
    #[must_use]
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Saves config to a TOML file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or file write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config to TOML")?;
        std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    }
}
