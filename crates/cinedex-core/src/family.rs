//! Content families: the per-family parameters of the generic repository.

use std::fmt::{self, Debug};
use std::hash::Hash;

use cinedex_api::tmdb::{
    MovieSummary, PageRequest, PersonSummary, SearchResultItem, TvShowSummary,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Everything that differs between the movies, TV, people, and search
/// repositories.
pub trait ContentFamily: Send + Sync + 'static {
    /// Category tag; one pagination sequence per value.
    type Category: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// Item shown to callers and stored in the cache.
    type Item: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Element type of the `results` array on the wire.
    type Wire: DeserializeOwned + Send + 'static;

    /// Category key prefix; disjoint across families.
    const NAMESPACE: &'static str;

    /// Stable cache and cursor key of a category.
    fn category_key(category: &Self::Category) -> String;

    /// Request for one page of a category.
    fn page_request(category: &Self::Category, page: u32, language: &str) -> PageRequest;

    /// Converts one wire result; `Ok(None)` skips it.
    ///
    /// # Errors
    ///
    /// Returns an error if the result does not have the expected shape.
    fn decode(category: &Self::Category, wire: Self::Wire)
    -> Result<Option<Self::Item>, serde_json::Error>;

    /// TMDB ID of an item, unique within a category.
    fn item_id(item: &Self::Item) -> u64;
}

/// Movie list categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovieCategory {
    /// `movie/popular`
    Popular,
    /// `movie/top_rated`
    TopRated,
    /// `movie/now_playing`
    NowPlaying,
    /// `movie/upcoming`
    Upcoming,
}

impl MovieCategory {
    /// Every movie category.
    pub const ALL: [Self; 4] = [Self::Popular, Self::TopRated, Self::NowPlaying, Self::Upcoming];

    /// Endpoint tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::TopRated => "top_rated",
            Self::NowPlaying => "now_playing",
            Self::Upcoming => "upcoming",
        }
    }
}

/// TV show list categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TvCategory {
    /// `tv/popular`
    Popular,
    /// `tv/top_rated`
    TopRated,
    /// `tv/on_the_air`
    OnTheAir,
    /// `tv/airing_today`
    AiringToday,
}

impl TvCategory {
    /// Every TV category.
    pub const ALL: [Self; 4] = [Self::Popular, Self::TopRated, Self::OnTheAir, Self::AiringToday];

    /// Endpoint tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::TopRated => "top_rated",
            Self::OnTheAir => "on_the_air",
            Self::AiringToday => "airing_today",
        }
    }
}

/// People list categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeopleCategory {
    /// `person/popular`
    Popular,
}

impl PeopleCategory {
    /// Endpoint tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Popular => "popular",
        }
    }
}

/// Search result filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchFilter {
    /// Mixed results from `search/multi`.
    All,
    /// `search/movie`
    Movies,
    /// `search/tv`
    Tv,
    /// `search/person`
    People,
}

impl SearchFilter {
    /// Endpoint tag under `search/`.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::All => "multi",
            Self::Movies => "movie",
            Self::Tv => "tv",
            Self::People => "person",
        }
    }

    /// Key segment.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Movies => "movie",
            Self::Tv => "tv",
            Self::People => "person",
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A search: filter plus query. Each distinct query paginates on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchCategory {
    filter: SearchFilter,
    query: String,
}

impl SearchCategory {
    /// Creates a search category; the query is trimmed.
    #[must_use]
    pub fn new(filter: SearchFilter, query: &str) -> Self {
        Self {
            filter,
            query: String::from(query.trim()),
        }
    }

    /// Result filter.
    #[must_use]
    pub const fn filter(&self) -> SearchFilter {
        self.filter
    }

    /// Trimmed query.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Movie lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoviesFamily;

impl ContentFamily for MoviesFamily {
    type Category = MovieCategory;
    type Item = MovieSummary;
    type Wire = MovieSummary;

    const NAMESPACE: &'static str = "movie";

    fn category_key(category: &MovieCategory) -> String {
        format!("{}/{}", Self::NAMESPACE, category.tag())
    }

    fn page_request(category: &MovieCategory, page: u32, language: &str) -> PageRequest {
        PageRequest::new(Self::category_key(category), page, language)
    }

    fn decode(
        _: &MovieCategory,
        wire: MovieSummary,
    ) -> Result<Option<MovieSummary>, serde_json::Error> {
        Ok(Some(wire))
    }

    fn item_id(item: &MovieSummary) -> u64 {
        item.id
    }
}

/// TV show lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct TvShowsFamily;

impl ContentFamily for TvShowsFamily {
    type Category = TvCategory;
    type Item = TvShowSummary;
    type Wire = TvShowSummary;

    const NAMESPACE: &'static str = "tv";

    fn category_key(category: &TvCategory) -> String {
        format!("{}/{}", Self::NAMESPACE, category.tag())
    }

    fn page_request(category: &TvCategory, page: u32, language: &str) -> PageRequest {
        PageRequest::new(Self::category_key(category), page, language)
    }

    fn decode(
        _: &TvCategory,
        wire: TvShowSummary,
    ) -> Result<Option<TvShowSummary>, serde_json::Error> {
        Ok(Some(wire))
    }

    fn item_id(item: &TvShowSummary) -> u64 {
        item.id
    }
}

/// People lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeopleFamily;

impl ContentFamily for PeopleFamily {
    type Category = PeopleCategory;
    type Item = PersonSummary;
    type Wire = PersonSummary;

    const NAMESPACE: &'static str = "person";

    fn category_key(category: &PeopleCategory) -> String {
        format!("{}/{}", Self::NAMESPACE, category.tag())
    }

    fn page_request(category: &PeopleCategory, page: u32, language: &str) -> PageRequest {
        PageRequest::new(Self::category_key(category), page, language)
    }

    fn decode(
        _: &PeopleCategory,
        wire: PersonSummary,
    ) -> Result<Option<PersonSummary>, serde_json::Error> {
        Ok(Some(wire))
    }

    fn item_id(item: &PersonSummary) -> u64 {
        item.id
    }
}

/// Search results.
///
/// Filter endpoints omit `media_type`, so results are decoded per filter
/// and wrapped into the matching [`SearchResultItem`] variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFamily;

impl ContentFamily for SearchFamily {
    type Category = SearchCategory;
    type Item = SearchResultItem;
    type Wire = serde_json::Value;

    const NAMESPACE: &'static str = "search";

    fn category_key(category: &SearchCategory) -> String {
        format!(
            "{}/{}/{}",
            Self::NAMESPACE,
            category.filter.tag(),
            category.query
        )
    }

    fn page_request(category: &SearchCategory, page: u32, language: &str) -> PageRequest {
        PageRequest::search(
            format!("search/{}", category.filter.endpoint()),
            category.query.as_str(),
            page,
            language,
        )
    }

    fn decode(
        category: &SearchCategory,
        wire: serde_json::Value,
    ) -> Result<Option<SearchResultItem>, serde_json::Error> {
        match category.filter {
            SearchFilter::All => {
                let media_type = wire
                    .get("media_type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                if !SearchResultItem::MEDIA_TYPES.contains(&media_type) {
                    tracing::debug!(media_type, "skipping search result of unknown media type");
                    return Ok(None);
                }
                serde_json::from_value(wire).map(Some)
            }
            SearchFilter::Movies => {
                serde_json::from_value(wire).map(|m| Some(SearchResultItem::Movie(m)))
            }
            SearchFilter::Tv => {
                serde_json::from_value(wire).map(|t| Some(SearchResultItem::TvShow(t)))
            }
            SearchFilter::People => {
                serde_json::from_value(wire).map(|p| Some(SearchResultItem::Person(p)))
            }
        }
    }

    fn item_id(item: &SearchResultItem) -> u64 {
        item.id()
    }
}
