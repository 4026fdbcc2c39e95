//! `EntityCache` and `CursorStore` trait definitions.
#![allow(clippy::future_not_send)]

use anyhow::Result;
use cinedex_db::{CachedEntity, StoredCursor};

/// Pagination progress of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Category key.
    pub category: String,
    /// Last page advanced to.
    pub current_page: u32,
    /// Total pages reported by the API, `0` while unknown.
    pub total_pages: u32,
    /// Highest page advanced to since the last reset.
    pub max_page: u32,
    /// Language the cached pages were fetched in.
    pub language: Option<String>,
}

impl PaginationCursor {
    /// The zero state: nothing fetched yet.
    #[must_use]
    pub fn zero(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            current_page: 0,
            total_pages: 0,
            max_page: 0,
            language: None,
        }
    }

    /// Whether nothing has been fetched since the last reset.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.max_page == 0 && self.total_pages == 0
    }

    /// Whether `page` lies past the last page the API reported.
    #[must_use]
    pub const fn is_exhausted_at(&self, page: u32) -> bool {
        self.total_pages > 0 && page > self.total_pages
    }
}

impl From<StoredCursor> for PaginationCursor {
    fn from(row: StoredCursor) -> Self {
        Self {
            category: row.category,
            current_page: row.current_page,
            total_pages: row.total_pages,
            max_page: row.max_page,
            language: row.language,
        }
    }
}

/// One item to cache: its TMDB ID and serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// TMDB ID, unique within a category.
    pub id: u64,
    /// JSON-serialized item.
    pub payload: String,
}

/// Local cache of list entities keyed by `(category, id)`.
#[trait_variant::make(EntityCache: Send)]
pub trait LocalEntityCache {
    /// Upserts one page of records; rank is the position in `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn upsert(&self, category: &str, page: u32, records: Vec<EntityRecord>)
    -> Result<usize>;

    /// Every cached entity of a category, ordered by `(page, rank)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    async fn get_all(&self, category: &str) -> Result<Vec<CachedEntity>>;

    /// Cached entities on pages `1..=max_page`, ordered by `(page, rank)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    async fn get_up_to(&self, category: &str, max_page: u32) -> Result<Vec<CachedEntity>>;

    /// Drops a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn clear(&self, category: &str) -> Result<usize>;

    /// Drops every category under a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn clear_namespace(&self, namespace: &str) -> Result<usize>;

    /// Drops everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn clear_all(&self) -> Result<usize>;
}

/// Persistent pagination cursors.
#[trait_variant::make(CursorStore: Send)]
pub trait LocalCursorStore {
    /// Cursor of a category, the zero state if none was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    async fn get_cursor(&self, category: &str) -> Result<PaginationCursor>;

    /// Records that `page` of `total_pages` was fetched in `language`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn advance(
        &self,
        category: &str,
        page: u32,
        total_pages: u32,
        language: &str,
    ) -> Result<()>;

    /// Resets a category to the zero state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn reset(&self, category: &str) -> Result<PaginationCursor>;

    /// Resets every category under a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn reset_namespace(&self, namespace: &str) -> Result<usize>;

    /// Resets every category.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    async fn reset_all(&self) -> Result<usize>;
}
