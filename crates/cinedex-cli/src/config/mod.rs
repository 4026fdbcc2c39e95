//! Application configuration module.
//!
//! Manages the TOML config file holding the TMDB endpoint settings and
//! the persisted user preferences (language, theme).

#[allow(clippy::module_inception)]
mod config;

#[allow(clippy::module_name_repetitions)]
pub use config::{AppConfig, TmdbConfig};
