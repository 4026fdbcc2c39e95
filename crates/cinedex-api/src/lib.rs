//! API client library for cinedex.
//!
//! Provides the TMDB v3 client used as the remote data source
//! for movie, TV show, people, and search listings.

/// TMDB API client.
pub mod tmdb;
