//! Content language resolution.
//!
//! The effective language is the persisted user choice, else the
//! platform default locale, else [`FALLBACK_LANGUAGE`].

use cinedex_api::tmdb::DEFAULT_LANGUAGE;
use tokio::sync::watch;

/// Language used when neither a preference nor a platform locale is known.
pub const FALLBACK_LANGUAGE: &str = DEFAULT_LANGUAGE;

/// Normalizes a BCP 47-ish language tag (`pt_br` becomes `pt-BR`).
///
/// Returns `None` for anything that is not `lang[-region|-subtag...]`
/// with a 2-3 letter primary language.
#[must_use]
pub fn normalize_language_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().replace('_', "-");
    let mut parts = tag.split('-');

    let primary = parts.next()?;
    if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut normalized = primary.to_ascii_lowercase();
    for part in parts {
        if part.is_empty() || part.len() > 8 || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        normalized.push('-');
        if part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
            normalized.push_str(&part.to_ascii_uppercase());
        } else {
            normalized.push_str(part);
        }
    }
    Some(normalized)
}

/// Derives a language tag from a POSIX locale value (`LC_ALL`, `LANG`).
///
/// `fr_FR.UTF-8@euro` becomes `fr-FR`; `C` and `POSIX` yield `None`.
#[must_use]
pub fn locale_from_env(value: &str) -> Option<String> {
    let base = value
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base.eq_ignore_ascii_case("C") || base.eq_ignore_ascii_case("POSIX") {
        return None;
    }
    normalize_language_tag(base)
}

/// Resolves the effective language from a preference and a platform default.
#[must_use]
pub fn resolve_language(preferred: Option<&str>, platform_default: Option<&str>) -> String {
    preferred
        .and_then(normalize_language_tag)
        .or_else(|| platform_default.and_then(normalize_language_tag))
        .unwrap_or_else(|| String::from(FALLBACK_LANGUAGE))
}

/// Source of the current content language.
///
/// Read-only view over the settings store's language preference.
#[derive(Debug, Clone)]
pub struct LanguageProvider {
    preference: watch::Receiver<Option<String>>,
    platform_default: Option<String>,
}

impl LanguageProvider {
    /// Creates a provider over a preference channel and an optional platform locale.
    #[must_use]
    pub fn new(
        preference: watch::Receiver<Option<String>>,
        platform_default: Option<String>,
    ) -> Self {
        Self {
            preference,
            platform_default,
        }
    }

    /// The language resolved right now.
    #[must_use]
    pub fn current(&self) -> String {
        resolve_language(
            self.preference.borrow().as_deref(),
            self.platform_default.as_deref(),
        )
    }

    /// Subscribes to the resolved language.
    ///
    /// The stream replays the latest value first, then yields every
    /// subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> LanguageStream {
        LanguageStream {
            preference: self.preference.clone(),
            platform_default: self.platform_default.clone(),
            replayed: false,
        }
    }
}

/// Replay-of-latest stream of resolved language tags.
#[derive(Debug)]
pub struct LanguageStream {
    preference: watch::Receiver<Option<String>>,
    platform_default: Option<String>,
    replayed: bool,
}

impl LanguageStream {
    /// Takes the latest resolved language without waiting.
    ///
    /// Counts as the replayed value: the next [`next`](Self::next) call
    /// waits for a change.
    pub fn latest(&mut self) -> String {
        self.replayed = true;
        let preferred = self.preference.borrow_and_update().clone();
        resolve_language(preferred.as_deref(), self.platform_default.as_deref())
    }

    /// Next resolved language.
    ///
    /// The first call returns the latest value immediately; later calls
    /// wait for the preference to change. Returns `None` once the settings
    /// store is gone.
    pub async fn next(&mut self) -> Option<String> {
        if self.replayed {
            self.preference.changed().await.ok()?;
        }
        Some(self.latest())
    }
}
