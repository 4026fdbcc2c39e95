//! SQLite implementation of the local stores.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use cinedex_db::CachedEntity;
use futures::future::BoxFuture;
use rusqlite::Connection;
use tracing::instrument;

use super::traits::{CursorStore, EntityCache, EntityRecord, PaginationCursor};
use crate::coordinator::{InvalidationListener, LanguageChange};

/// SQLite-backed [`EntityCache`] and [`CursorStore`].
///
/// Cheap to clone; every clone shares one connection. Queries run on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens an in-memory store with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(cinedex_db::open_in_memory()?))
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await
        .context("storage task failed")?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl EntityCache for SqliteStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(
        &self,
        category: &str,
        page: u32,
        records: Vec<EntityRecord>,
    ) -> Result<usize> {
        let category = String::from(category);
        let fetched_at = now();
        let entities: Vec<CachedEntity> = records
            .into_iter()
            .zip(0_u32..)
            .map(|(record, rank)| CachedEntity {
                category: category.clone(),
                id: record.id,
                page,
                rank,
                payload: record.payload,
                fetched_at: fetched_at.clone(),
            })
            .collect();
        self.run(move |conn| cinedex_db::upsert_entities(conn, &entities))
            .await
    }

    async fn get_all(&self, category: &str) -> Result<Vec<CachedEntity>> {
        let category = String::from(category);
        self.run(move |conn| cinedex_db::load_entities(conn, &category))
            .await
    }

    async fn get_up_to(&self, category: &str, max_page: u32) -> Result<Vec<CachedEntity>> {
        let category = String::from(category);
        self.run(move |conn| cinedex_db::load_entities_up_to(conn, &category, max_page))
            .await
    }

    #[instrument(skip(self))]
    async fn clear(&self, category: &str) -> Result<usize> {
        let category = String::from(category);
        self.run(move |conn| cinedex_db::delete_entities(conn, &category))
            .await
    }

    #[instrument(skip(self))]
    async fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let namespace = String::from(namespace);
        self.run(move |conn| cinedex_db::delete_entities_in_namespace(conn, &namespace))
            .await
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<usize> {
        self.run(cinedex_db::delete_all_entities).await
    }
}

impl CursorStore for SqliteStore {
    async fn get_cursor(&self, category: &str) -> Result<PaginationCursor> {
        let key = String::from(category);
        let stored = self
            .run(move |conn| cinedex_db::load_cursor(conn, &key))
            .await?;
        Ok(stored.map_or_else(|| PaginationCursor::zero(category), PaginationCursor::from))
    }

    #[instrument(skip(self))]
    async fn advance(
        &self,
        category: &str,
        page: u32,
        total_pages: u32,
        language: &str,
    ) -> Result<()> {
        let category = String::from(category);
        let language = String::from(language);
        let updated_at = now();
        self.run(move |conn| {
            cinedex_db::save_cursor(
                conn,
                &category,
                page,
                total_pages,
                Some(&language),
                &updated_at,
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn reset(&self, category: &str) -> Result<PaginationCursor> {
        let key = String::from(category);
        self.run(move |conn| cinedex_db::delete_cursor(conn, &key))
            .await?;
        Ok(PaginationCursor::zero(category))
    }

    #[instrument(skip(self))]
    async fn reset_namespace(&self, namespace: &str) -> Result<usize> {
        let namespace = String::from(namespace);
        self.run(move |conn| cinedex_db::delete_cursors_in_namespace(conn, &namespace))
            .await
    }

    #[instrument(skip(self))]
    async fn reset_all(&self) -> Result<usize> {
        self.run(cinedex_db::delete_all_cursors).await
    }
}

/// Wipes the whole store on a language change.
///
/// Registered by front ends that change the language while no repository
/// is alive to invalidate its own namespace.
impl InvalidationListener for SqliteStore {
    fn name(&self) -> &str {
        "sqlite-store"
    }

    fn on_language_changed(
        self: Arc<Self>,
        change: LanguageChange,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let entities = self.clear_all().await?;
            let cursors = self.reset_all().await?;
            tracing::info!(
                from = %change.previous,
                to = %change.current,
                entities,
                cursors,
                "local store cleared for new language"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn record(id: u64, title: &str) -> EntityRecord {
        EntityRecord {
            id,
            payload: format!(r#"{{"id":{id},"title":"{title}"}}"#),
        }
    }

    #[tokio::test]
    async fn test_missing_cursor_is_zero_state() {
        // Arrange
        let store = SqliteStore::in_memory().unwrap();

        // Act
        let cursor = store.get_cursor("movie/popular").await.unwrap();

        // Assert
        assert_eq!(cursor, PaginationCursor::zero("movie/popular"));
        assert!(cursor.is_zero());
        assert!(!cursor.is_exhausted_at(1));
    }

    #[tokio::test]
    async fn test_advance_tracks_max_page_and_language() {
        // Arrange
        let store = SqliteStore::in_memory().unwrap();
        store.advance("tv/popular", 1, 10, "en").await.unwrap();
        store.advance("tv/popular", 2, 10, "en").await.unwrap();

        // Act: re-advancing to page 1 must not shrink the cached range
        store.advance("tv/popular", 1, 10, "en").await.unwrap();
        let cursor = store.get_cursor("tv/popular").await.unwrap();

        // Assert
        assert_eq!(cursor.current_page, 1);
        assert_eq!(cursor.max_page, 2);
        assert_eq!(cursor.language.as_deref(), Some("en"));
        assert!(cursor.is_exhausted_at(11));
        assert!(!cursor.is_exhausted_at(10));
    }

    #[tokio::test]
    async fn test_upsert_assigns_rank_in_order() {
        // Arrange
        let store = SqliteStore::in_memory().unwrap();

        // Act
        store
            .upsert("movie/popular", 1, vec![record(7, "B"), record(3, "A")])
            .await
            .unwrap();
        let cached = store.get_all("movie/popular").await.unwrap();

        // Assert
        let ids: Vec<u64> = cached.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 3]);
        assert_eq!(cached[1].rank, 1);
        assert_eq!(cached[0].page, 1);
    }

    #[tokio::test]
    async fn test_cache_survives_reopen() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        {
            let store = SqliteStore::new(cinedex_db::open_db(Some(&dir_path)).unwrap());
            store
                .upsert("movie/popular", 1, vec![record(949, "Heat")])
                .await
                .unwrap();
            store.advance("movie/popular", 1, 500, "fr-FR").await.unwrap();
        }

        // Act
        let reopened = SqliteStore::new(cinedex_db::open_db(Some(&dir_path)).unwrap());
        let cached = reopened.get_all("movie/popular").await.unwrap();
        let cursor = reopened.get_cursor("movie/popular").await.unwrap();

        // Assert
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, 949);
        assert_eq!(cursor.max_page, 1);
        assert_eq!(cursor.total_pages, 500);
        assert_eq!(cursor.language.as_deref(), Some("fr-FR"));
    }

    #[tokio::test]
    async fn test_reset_namespace_leaves_other_families() {
        // Arrange
        let store = SqliteStore::in_memory().unwrap();
        store.advance("movie/popular", 1, 10, "en").await.unwrap();
        store.advance("movie/upcoming", 1, 10, "en").await.unwrap();
        store.advance("tv/popular", 1, 10, "en").await.unwrap();

        // Act
        let reset = store.reset_namespace("movie").await.unwrap();

        // Assert
        assert_eq!(reset, 2);
        assert!(store.get_cursor("movie/popular").await.unwrap().is_zero());
        assert_eq!(store.get_cursor("tv/popular").await.unwrap().max_page, 1);
    }

    #[tokio::test]
    async fn test_language_change_wipes_store() {
        // Arrange
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .upsert("search/all/heat", 1, vec![record(949, "Heat")])
            .await
            .unwrap();
        store.advance("search/all/heat", 1, 4, "en").await.unwrap();

        // Act
        Arc::clone(&store)
            .on_language_changed(LanguageChange {
                previous: String::from("en"),
                current: String::from("fr"),
            })
            .await
            .unwrap();

        // Assert
        assert!(store.get_all("search/all/heat").await.unwrap().is_empty());
        assert!(store.get_cursor("search/all/heat").await.unwrap().is_zero());
    }
}
