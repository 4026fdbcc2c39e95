//! `TmdbClient` - TMDB API client implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::api::TmdbApi;
use super::error::FetchError;
use super::rate_limiter::TmdbRateLimiter;
use super::types::{
    MovieDetails, PageRequest, PageResponse, PersonDetails, TmdbErrorResponse, TvShowDetails,
};

/// Default base URL for TMDB API v3.
const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// TMDB API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClient {
    /// HTTP client.
    http_client: Client,
    /// Base URL for API requests.
    base_url: Url,
    /// Bearer API token.
    api_token: String,
    /// Request spacing.
    rate_limiter: Arc<Mutex<TmdbRateLimiter>>,
}

/// Builder for `TmdbClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClientBuilder {
    base_url: Option<Url>,
    api_token: Option<String>,
    user_agent: Option<String>,
    min_interval: Option<Duration>,
    timeout: Option<Duration>,
}

impl TmdbClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            api_token: None,
            user_agent: None,
            min_interval: None,
            timeout: None,
        }
    }

    /// Overrides the base URL (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the API bearer token (required).
    #[must_use]
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the minimum request interval (default: 25ms).
    #[must_use]
    pub const fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    /// Sets the per-request timeout (default: 15s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `api_token` is not set.
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<TmdbClient> {
        let api_token = self.api_token.context("api_token is required")?;
        let user_agent = self.user_agent.context("user_agent is required")?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            let result = Url::parse(DEFAULT_BASE_URL);
            result.context("invalid default base URL")?
        };

        let rate_limiter = self
            .min_interval
            .map_or_else(TmdbRateLimiter::default_interval, TmdbRateLimiter::new);

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .gzip(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(TmdbClient {
            http_client,
            base_url,
            api_token,
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
        })
    }
}

impl TmdbClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> TmdbClientBuilder {
        TmdbClientBuilder::new()
    }

    /// Sends one GET request with Bearer auth, query params, and request spacing.
    ///
    /// Maps every failure into a [`FetchError`]; never retries.
    #[instrument(skip_all, fields(path = path))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, FetchError> {
        let url = self.base_url.join(path).map_err(|e| {
            FetchError::InvalidRequest(format!("failed to join URL path {path}: {e}"))
        })?;

        let slot = self
            .rate_limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reserve();
        tokio::time::sleep_until(slot).await;

        let request = self
            .http_client
            .get(url)
            .bearer_auth(&self.api_token)
            .query(query)
            .build()
            .map_err(|source| FetchError::Transport {
                path: String::from(path),
                source,
            })?;

        tracing::debug!(url = %request.url(), "TMDB API request");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|source| FetchError::Transport {
                path: String::from(path),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                path: String::from(path),
                source,
            })?;

        if !status.is_success() {
            return Err(status_error(status, path, &body));
        }

        serde_json::from_str(&body).map_err(|source| {
            tracing::error!(path, error = %source, "TMDB response does not match expected shape");
            FetchError::Deserialization {
                path: String::from(path),
                source,
            }
        })
    }
}

/// Maps a non-2xx response to a [`FetchError`].
fn status_error(status: StatusCode, path: &str, body: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound {
            path: String::from(path),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!(path, "TMDB API rate limited (429)");
            FetchError::RateLimited {
                path: String::from(path),
            }
        }
        _ => match serde_json::from_str::<TmdbErrorResponse>(body) {
            Ok(error_response) => FetchError::Api {
                status: status.as_u16(),
                code: Some(error_response.status_code),
                message: error_response.status_message,
            },
            Err(_) => FetchError::Api {
                status: status.as_u16(),
                code: None,
                message: String::from(body),
            },
        },
    }
}

impl TmdbApi for TmdbClient {
    #[instrument(skip_all, fields(path = %request.path, page = request.page))]
    async fn fetch_page<T: DeserializeOwned + Send>(
        &self,
        request: &PageRequest,
    ) -> Result<PageResponse<T>, FetchError> {
        self.get_json(&request.path, &request.query_pairs()).await
    }

    #[instrument(skip_all)]
    async fn movie_details(
        &self,
        movie_id: u64,
        language: &str,
    ) -> Result<MovieDetails, FetchError> {
        let path = format!("movie/{movie_id}");
        let query = [(String::from("language"), String::from(language))];
        self.get_json(&path, &query).await
    }

    #[instrument(skip_all)]
    async fn tv_details(
        &self,
        series_id: u64,
        language: &str,
    ) -> Result<TvShowDetails, FetchError> {
        let path = format!("tv/{series_id}");
        let query = [(String::from("language"), String::from(language))];
        self.get_json(&path, &query).await
    }

    #[instrument(skip_all)]
    async fn person_details(
        &self,
        person_id: u64,
        language: &str,
    ) -> Result<PersonDetails, FetchError> {
        let path = format!("person/{person_id}");
        let query = [(String::from("language"), String::from(language))];
        self.get_json(&path, &query).await
    }
}
