//! TMDB API response types and request parameters.

use serde::{Deserialize, Serialize};

/// Default response language when none is resolved.
pub const DEFAULT_LANGUAGE: &str = "en";

// --- Paginated lists ---

/// One page of a paginated TMDB listing (`movie/popular`, `search/multi`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// Current page number (1-based).
    pub page: u32,
    /// Results on this page, in rank order.
    pub results: Vec<T>,
    /// Total number of pages.
    pub total_pages: u32,
    /// Total number of results (absent on some endpoints).
    #[serde(default)]
    pub total_results: Option<u32>,
}

/// A movie as it appears in list and search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieSummary {
    /// TMDB movie ID.
    pub id: u64,
    /// Localized title.
    pub title: String,
    /// Original title.
    #[serde(default)]
    pub original_title: Option<String>,
    /// Original language (ISO 639-1).
    #[serde(default)]
    pub original_language: Option<String>,
    /// Release date (YYYY-MM-DD).
    #[serde(default)]
    pub release_date: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: Option<String>,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Vote average.
    #[serde(default)]
    pub vote_average: f64,
    /// Vote count.
    #[serde(default)]
    pub vote_count: u32,
    /// Genre IDs.
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    /// Adult flag.
    #[serde(default)]
    pub adult: bool,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

/// A TV show as it appears in list and search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvShowSummary {
    /// TMDB series ID.
    pub id: u64,
    /// Localized name.
    pub name: String,
    /// Original name.
    #[serde(default)]
    pub original_name: Option<String>,
    /// Original language (ISO 639-1).
    #[serde(default)]
    pub original_language: Option<String>,
    /// Origin countries (ISO 3166-1).
    #[serde(default)]
    pub origin_country: Vec<String>,
    /// First air date (YYYY-MM-DD).
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: Option<String>,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Vote average.
    #[serde(default)]
    pub vote_average: f64,
    /// Vote count.
    #[serde(default)]
    pub vote_count: u32,
    /// Genre IDs.
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

/// A person as it appears in list and search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    /// TMDB person ID.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Department the person is mostly credited in (e.g., "Acting").
    #[serde(default)]
    pub known_for_department: Option<String>,
    /// Profile image path.
    #[serde(default)]
    pub profile_path: Option<String>,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Adult flag.
    #[serde(default)]
    pub adult: bool,
}

/// A mixed search result, discriminated by the `media_type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "media_type", rename_all = "snake_case")]
pub enum SearchResultItem {
    /// Movie result.
    Movie(MovieSummary),
    /// TV show result.
    #[serde(rename = "tv")]
    TvShow(TvShowSummary),
    /// Person result.
    Person(PersonSummary),
}

impl SearchResultItem {
    /// Media types understood by [`SearchResultItem`].
    pub const MEDIA_TYPES: [&'static str; 3] = ["movie", "tv", "person"];

    /// TMDB ID of the wrapped entity.
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Self::Movie(m) => m.id,
            Self::TvShow(t) => t.id,
            Self::Person(p) => p.id,
        }
    }

    /// Display title (movie title, show name, or person name).
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Movie(m) => &m.title,
            Self::TvShow(t) => &t.name,
            Self::Person(p) => &p.name,
        }
    }

    /// The `media_type` tag of this result.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Movie(_) => "movie",
            Self::TvShow(_) => "tv",
            Self::Person(_) => "person",
        }
    }
}

// --- Details ---

/// Genre entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Genre ID.
    pub id: u32,
    /// Genre name.
    pub name: String,
}

/// Response from `movie/{movie_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    /// TMDB movie ID.
    pub id: u64,
    /// Localized title.
    pub title: String,
    /// Original title.
    #[serde(default)]
    pub original_title: Option<String>,
    /// Tagline.
    #[serde(default)]
    pub tagline: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: Option<String>,
    /// Release date.
    #[serde(default)]
    pub release_date: Option<String>,
    /// Runtime in minutes.
    #[serde(default)]
    pub runtime: Option<u32>,
    /// Release status (e.g., "Released").
    #[serde(default)]
    pub status: Option<String>,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<Genre>,
    /// IMDb ID.
    #[serde(default)]
    pub imdb_id: Option<String>,
    /// Vote average.
    #[serde(default)]
    pub vote_average: f64,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

/// Response from `tv/{series_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvShowDetails {
    /// TMDB series ID.
    pub id: u64,
    /// Localized name.
    pub name: String,
    /// Original name.
    #[serde(default)]
    pub original_name: Option<String>,
    /// Overview text.
    #[serde(default)]
    pub overview: Option<String>,
    /// First air date.
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// Last air date.
    #[serde(default)]
    pub last_air_date: Option<String>,
    /// Total number of seasons.
    #[serde(default)]
    pub number_of_seasons: u32,
    /// Total number of episodes.
    #[serde(default)]
    pub number_of_episodes: u32,
    /// Status (e.g., "Returning Series", "Ended").
    #[serde(default)]
    pub status: Option<String>,
    /// Whether the show is still in production.
    #[serde(default)]
    pub in_production: bool,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<Genre>,
    /// Vote average.
    #[serde(default)]
    pub vote_average: f64,
    /// Poster image path.
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// Response from `person/{person_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDetails {
    /// TMDB person ID.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Biography (localized, may be empty).
    #[serde(default)]
    pub biography: Option<String>,
    /// Birthday (YYYY-MM-DD).
    #[serde(default)]
    pub birthday: Option<String>,
    /// Day of death (YYYY-MM-DD).
    #[serde(default)]
    pub deathday: Option<String>,
    /// Place of birth.
    #[serde(default)]
    pub place_of_birth: Option<String>,
    /// Department the person is mostly credited in.
    #[serde(default)]
    pub known_for_department: Option<String>,
    /// Alternative names.
    #[serde(default)]
    pub also_known_as: Vec<String>,
    /// Popularity score.
    #[serde(default)]
    pub popularity: f64,
    /// Profile image path.
    #[serde(default)]
    pub profile_path: Option<String>,
}

// --- Error Response ---

/// TMDB API error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbErrorResponse {
    /// TMDB error code.
    pub status_code: u32,
    /// Error message.
    pub status_message: String,
    /// Success flag (always false for errors).
    #[serde(default)]
    #[allow(dead_code)]
    pub success: bool,
}

// --- Request Parameters ---

/// A single page request against a listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Endpoint path relative to the API base (e.g., `movie/popular`).
    pub path: String,
    /// Page number (1-based).
    pub page: u32,
    /// Response language.
    pub language: String,
    /// Extra query parameters (`query`, `include_adult`, ...).
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    /// Creates a request for `path` at `page` in `language`.
    pub fn new(path: impl Into<String>, page: u32, language: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            page,
            language: language.into(),
            params: Vec::new(),
        }
    }

    /// Creates a search request; adult results are always excluded.
    pub fn search(
        path: impl Into<String>,
        query: impl Into<String>,
        page: u32,
        language: impl Into<String>,
    ) -> Self {
        Self::new(path, page, language)
            .param("query", query)
            .param("include_adult", "false")
    }

    /// Appends an extra query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Full query string pairs in request order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (String::from("page"), self.page.to_string()),
            (String::from("language"), self.language.clone()),
        ];
        pairs.extend(self.params.iter().cloned());
        pairs
    }
}
