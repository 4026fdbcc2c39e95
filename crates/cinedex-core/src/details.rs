//! Single-value detail lookups.

use std::sync::Arc;

use cinedex_api::tmdb::{MovieDetails, PersonDetails, TmdbApi, TvShowDetails};
use tracing::instrument;

use crate::error::RepoError;
use crate::language::LanguageProvider;

/// Movie, TV show, and person details in the current language.
///
/// Details are not cached; every call performs one request.
#[derive(Debug)]
pub struct DetailsRepository<A> {
    api: Arc<A>,
    language: LanguageProvider,
}

impl<A> Clone for DetailsRepository<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            language: self.language.clone(),
        }
    }
}

impl<A: TmdbApi + Send + Sync> DetailsRepository<A> {
    /// Creates a repository over an API client.
    #[must_use]
    pub const fn new(api: Arc<A>, language: LanguageProvider) -> Self {
        Self { api, language }
    }

    /// Movie details.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] for an unknown ID, or the remote
    /// failure mapped into [`RepoError`].
    #[instrument(skip(self))]
    pub async fn movie(&self, id: u64) -> Result<MovieDetails, RepoError> {
        let language = self.language.current();
        self.api
            .movie_details(id, &language)
            .await
            .map_err(RepoError::from)
            .inspect_err(|e| tracing::warn!(error = %e, "movie lookup failed"))
    }

    /// TV show details.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] for an unknown ID, or the remote
    /// failure mapped into [`RepoError`].
    #[instrument(skip(self))]
    pub async fn tv_show(&self, id: u64) -> Result<TvShowDetails, RepoError> {
        let language = self.language.current();
        self.api
            .tv_details(id, &language)
            .await
            .map_err(RepoError::from)
            .inspect_err(|e| tracing::warn!(error = %e, "tv show lookup failed"))
    }

    /// Person details.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] for an unknown ID, or the remote
    /// failure mapped into [`RepoError`].
    #[instrument(skip(self))]
    pub async fn person(&self, id: u64) -> Result<PersonDetails, RepoError> {
        let language = self.language.current();
        self.api
            .person_details(id, &language)
            .await
            .map_err(RepoError::from)
            .inspect_err(|e| tracing::warn!(error = %e, "person lookup failed"))
    }
}
