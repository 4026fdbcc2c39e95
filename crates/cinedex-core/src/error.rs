//! Errors surfaced to callers of the repositories.

use std::error::Error as _;

use cinedex_api::tmdb::FetchError;
use thiserror::Error;

/// Failure of a repository operation.
///
/// Storage failures never appear here: they are logged and absorbed
/// (a failed cache read is a cache miss, a failed cursor write is ignored).
/// `Clone` so the error can be published in [`LoadState`](crate::LoadState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum RepoError {
    /// Network unreachable, timeout, or TLS failure.
    #[error("network error: {0}")]
    Transport(String),

    /// The API answered with an unexpected shape.
    #[error("unexpected response from TMDB: {0}")]
    Deserialization(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API rejected the request because of rate limiting.
    #[error("TMDB rate limit exceeded, try again later")]
    RateLimited,

    /// Any other non-2xx answer.
    #[error("TMDB API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Pages are numbered from 1.
    #[error("page {page} is not a valid page number")]
    InvalidPage {
        /// Requested page.
        page: u32,
    },

    /// A background task failed to complete.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepoError {
    /// Whether re-invoking the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Internal(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Deserialization(_) | Self::NotFound(_) | Self::InvalidPage { .. } => false,
        }
    }
}

impl From<FetchError> for RepoError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Transport { ref path, .. } => {
                let detail = error
                    .source()
                    .map_or_else(String::new, |source| format!(": {source}"));
                Self::Transport(format!("{path}{detail}"))
            }
            FetchError::Deserialization { path, source } => {
                Self::Deserialization(format!("{path}: {source}"))
            }
            FetchError::NotFound { path } => Self::NotFound(path),
            FetchError::RateLimited { .. } => Self::RateLimited,
            FetchError::Api {
                status, message, ..
            } => Self::Api { status, message },
            FetchError::InvalidRequest(message) => Self::Internal(message),
        }
    }
}
