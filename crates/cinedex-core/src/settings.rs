//! User preference store (language and theme).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::language::normalize_language_tag;

/// UI theme choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the platform setting.
    #[default]
    System,
    /// Light theme.
    Light,
    /// Dark theme.
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        })
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme: {other} (expected system, light, or dark)")),
        }
    }
}

/// Persisted user preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Chosen content language tag; `None` follows the platform locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Chosen theme.
    #[serde(default)]
    pub theme: Theme,
}

/// Observable preference store.
///
/// Every value is held in a `watch` channel so observers always see the
/// latest value first. Persisting the values is the owner's concern.
#[derive(Debug)]
pub struct Settings {
    language: watch::Sender<Option<String>>,
    theme: watch::Sender<Theme>,
}

impl Settings {
    /// Creates a store seeded with persisted preferences.
    #[must_use]
    pub fn new(preferences: Preferences) -> Self {
        let language = preferences
            .language
            .as_deref()
            .and_then(normalize_language_tag);
        Self {
            language: watch::Sender::new(language),
            theme: watch::Sender::new(preferences.theme),
        }
    }

    /// Subscribes to the persisted language preference.
    #[must_use]
    pub fn language_preference(&self) -> watch::Receiver<Option<String>> {
        self.language.subscribe()
    }

    /// Current language preference.
    #[must_use]
    pub fn language(&self) -> Option<String> {
        self.language.borrow().clone()
    }

    /// Sets (or clears, with `None`) the language preference.
    ///
    /// Returns `true` when the stored value changed. Invalid tags are
    /// treated as `None`.
    pub fn set_language(&self, language: Option<&str>) -> bool {
        let next = language.and_then(normalize_language_tag);
        self.language.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                tracing::info!(from = ?current, to = ?next, "language preference changed");
                current.clone_from(&next);
                true
            }
        })
    }

    /// Subscribes to the theme preference.
    #[must_use]
    pub fn theme_preference(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }

    /// Current theme.
    #[must_use]
    pub fn theme(&self) -> Theme {
        *self.theme.borrow()
    }

    /// Sets the theme. Returns `true` when the stored value changed.
    pub fn set_theme(&self, theme: Theme) -> bool {
        self.theme.send_if_modified(|current| {
            if *current == theme {
                false
            } else {
                *current = theme;
                true
            }
        })
    }

    /// Snapshot of all preferences, for persisting.
    #[must_use]
    pub fn snapshot(&self) -> Preferences {
        Preferences {
            language: self.language(),
            theme: self.theme(),
        }
    }
}
