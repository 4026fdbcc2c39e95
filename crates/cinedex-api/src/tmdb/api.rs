//! `TmdbApi` trait definition.
#![allow(clippy::future_not_send)]

use serde::de::DeserializeOwned;

use super::error::FetchError;
use super::types::{MovieDetails, PageRequest, PageResponse, PersonDetails, TvShowDetails};

/// TMDB API trait.
///
/// Abstracts API operations for mock substitution in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(TmdbApi: Send)]
pub trait LocalTmdbApi {
    /// Fetches one page of a listing endpoint.
    ///
    /// Performs exactly one GET; no caching and no retry.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the HTTP request fails, the status is
    /// not 2xx, or the body does not decode into `T`.
    async fn fetch_page<T: DeserializeOwned + Send>(
        &self,
        request: &PageRequest,
    ) -> Result<PageResponse<T>, FetchError>;

    /// Fetches movie details.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for unknown IDs, or another
    /// [`FetchError`] if the request or decoding fails.
    async fn movie_details(&self, movie_id: u64, language: &str)
    -> Result<MovieDetails, FetchError>;

    /// Fetches TV series details.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for unknown IDs, or another
    /// [`FetchError`] if the request or decoding fails.
    async fn tv_details(&self, series_id: u64, language: &str)
    -> Result<TvShowDetails, FetchError>;

    /// Fetches person details.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for unknown IDs, or another
    /// [`FetchError`] if the request or decoding fails.
    async fn person_details(
        &self,
        person_id: u64,
        language: &str,
    ) -> Result<PersonDetails, FetchError>;
}
