//! Shared command context: config, preferences, and service wiring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cinedex_api::tmdb::TmdbClient;
use cinedex_core::{
    LanguageChangeCoordinator, LanguageProvider, Settings, SqliteStore, locale_from_env,
};
use cinedex_db::{AppDir, open_db};

use crate::config::AppConfig;

/// Config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variables consulted for the platform locale, in order.
const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_MESSAGES", "LANG"];

/// Loaded configuration plus the preference store built from it.
pub struct App {
    dir: Option<PathBuf>,
    config_path: PathBuf,
    config: AppConfig,
    pub settings: Settings,
    pub provider: LanguageProvider,
    pub coordinator: Arc<LanguageChangeCoordinator>,
}

impl App {
    /// Loads the config file and seeds the preference store from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config path cannot be resolved or the file
    /// cannot be parsed.
    pub fn load(dir: Option<&PathBuf>) -> Result<Self> {
        let config_path = AppDir::Config.file(dir.map(PathBuf::as_path), CONFIG_FILE_NAME)?;
        let config = AppConfig::load(&config_path)?;
        let settings = Settings::new(config.preferences.clone());
        let provider = LanguageProvider::new(settings.language_preference(), platform_locale());
        tracing::debug!(
            path = %config_path.display(),
            language = %provider.current(),
            "configuration loaded"
        );

        Ok(Self {
            dir: dir.cloned(),
            config_path,
            config,
            settings,
            provider,
            coordinator: Arc::new(LanguageChangeCoordinator::new()),
        })
    }

    /// Opens the local cache database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>> {
        let conn = open_db(self.dir.as_ref()).context("failed to open database")?;
        Ok(Arc::new(SqliteStore::new(conn)))
    }

    /// Builds the TMDB client from `TMDB_API_TOKEN` and the `[tmdb]` config.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing, the configured base URL
    /// is invalid, or the HTTP client cannot be built.
    pub fn tmdb_client(&self) -> Result<Arc<TmdbClient>> {
        let api_token = std::env::var("TMDB_API_TOKEN")
            .context("TMDB_API_TOKEN environment variable is required")?;

        let mut builder = TmdbClient::builder().api_token(api_token).user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(base_url) = self.config.tmdb.base_url()? {
            builder = builder.base_url(base_url);
        }
        if let Some(interval) = self.config.tmdb.min_interval() {
            builder = builder.min_interval(interval);
        }
        let client = builder.build().context("failed to build TMDB client")?;
        Ok(Arc::new(client))
    }

    /// Writes the current preferences back to the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&mut self) -> Result<()> {
        self.config.preferences = self.settings.snapshot();
        self.config.save(&self.config_path)?;
        tracing::debug!(path = %self.config_path.display(), "preferences saved");
        Ok(())
    }
}

/// First usable locale among `LC_ALL`, `LC_MESSAGES`, and `LANG`.
fn platform_locale() -> Option<String> {
    LOCALE_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find_map(|value| locale_from_env(&value))
}
