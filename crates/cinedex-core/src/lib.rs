//! Pagination, cache invalidation, and language coordination for cinedex.
//!
//! Repositories serve TMDB listings page by page from a local cache,
//! fetching only what is missing, and drop everything they cached when
//! the content language changes.

pub mod coordinator;
pub mod details;
pub mod error;
pub mod family;
pub mod language;
pub mod repository;
pub mod settings;
pub mod state;
pub mod store;

pub use coordinator::{
    DispatchReport, InvalidationListener, LanguageChange, LanguageChangeCoordinator, Registration,
};
pub use details::DetailsRepository;
pub use error::RepoError;
pub use family::{
    ContentFamily, MovieCategory, MoviesFamily, PeopleCategory, PeopleFamily, SearchCategory,
    SearchFamily, SearchFilter, TvCategory, TvShowsFamily,
};
pub use language::{
    FALLBACK_LANGUAGE, LanguageProvider, LanguageStream, locale_from_env, normalize_language_tag,
    resolve_language,
};
pub use repository::{
    MovieRepository, PeopleRepository, Repository, SearchRepository, TvShowRepository,
};
pub use settings::{Preferences, Settings, Theme};
pub use state::{LoadState, Page, PageOrigin};
pub use store::{CursorStore, EntityCache, EntityRecord, PaginationCursor, SqliteStore};
