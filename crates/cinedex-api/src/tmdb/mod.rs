//! TMDB API client module.
//!
//! Handles HTTP requests to the TMDB API v3 endpoints and maps
//! every response into typed pages, details, or a [`FetchError`].

mod api;
mod client;
mod error;
mod rate_limiter;
mod types;

#[allow(clippy::module_name_repetitions)]
pub use api::{LocalTmdbApi, TmdbApi};
#[allow(clippy::module_name_repetitions)]
pub use client::{TmdbClient, TmdbClientBuilder};
pub use error::FetchError;
pub use types::{
    DEFAULT_LANGUAGE, Genre, MovieDetails, MovieSummary, PageRequest, PageResponse, PersonDetails,
    PersonSummary, SearchResultItem, TvShowDetails, TvShowSummary,
};
