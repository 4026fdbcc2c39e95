//! Typed errors returned by TMDB requests.

use thiserror::Error;

/// Failure of a single TMDB request.
///
/// Every non-2xx status and every malformed body maps to one of these
/// variants; the client never panics on remote input.
#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum FetchError {
    /// Network unreachable, timeout, TLS failure, or an unreadable body.
    #[error("request failed: {path}")]
    Transport {
        /// Endpoint path.
        path: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode JSON response: {path}")]
    Deserialization {
        /// Endpoint path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// HTTP 404: the requested entity does not exist.
    #[error("TMDB resource not found: {path}")]
    NotFound {
        /// Endpoint path.
        path: String,
    },

    /// HTTP 429: the request budget is exhausted.
    #[error("TMDB API rate limit exceeded: {path}")]
    RateLimited {
        /// Endpoint path.
        path: String,
    },

    /// Any other non-2xx response.
    #[error("TMDB API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// TMDB error code, when the body carried one.
        code: Option<u32>,
        /// TMDB error message or raw body.
        message: String,
    },

    /// The request could not be built (bad path or base URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether re-issuing the same request may succeed.
    ///
    /// Transport failures, rate limiting, and server-side errors are
    /// retryable; decoding failures indicate an API contract change.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Deserialization { .. } | Self::NotFound { .. } | Self::InvalidRequest(_) => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_retryable_classification() {
        // Arrange
        let rate_limited = FetchError::RateLimited {
            path: String::from("movie/popular"),
        };
        let server = FetchError::Api {
            status: 503,
            code: None,
            message: String::from("unavailable"),
        };
        let unauthorized = FetchError::Api {
            status: 401,
            code: Some(7),
            message: String::from("Invalid API key"),
        };
        let not_found = FetchError::NotFound {
            path: String::from("person/0"),
        };
        let decode = FetchError::Deserialization {
            path: String::from("movie/popular"),
            source: serde_json::from_str::<u32>("{").unwrap_err(),
        };

        // Act & Assert
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!decode.is_retryable());
    }

    #[test]
    fn test_api_error_message() {
        // Arrange
        let error = FetchError::Api {
            status: 401,
            code: Some(7),
            message: String::from("Invalid API key"),
        };

        // Act
        let message = error.to_string();

        // Assert
        assert!(message.contains("TMDB API error"));
        assert!(message.contains("401"));
        assert!(message.contains("Invalid API key"));
    }
}
