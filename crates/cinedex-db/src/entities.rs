//! Cached list entity CRUD operations.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// A list entity cached under a category key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntity {
    /// Category key (e.g., `movie/popular`).
    pub category: String,
    /// TMDB entity ID, unique within the category.
    pub id: u64,
    /// Page the entity was fetched on (1-based).
    pub page: u32,
    /// Position within that page (0-based).
    pub rank: u32,
    /// JSON-serialized entity.
    pub payload: String,
    /// Fetch timestamp (RFC 3339).
    pub fetched_at: String,
}

/// SQL predicate matching every category key under a namespace.
const NAMESPACE_PREDICATE: &str = "substr(category, 1, length(?1) + 1) = ?1 || '/'";

/// Upserts entities keyed by `(category, id)`. Returns the number of rows written.
///
/// Re-upserting an existing key overwrites page, rank, and payload,
/// so repeating the same write never duplicates a record.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn upsert_entities(conn: &Connection, entities: &[CachedEntity]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin transaction")?;

    let mut stmt = tx
        .prepare(
            "INSERT INTO cached_entities (category, id, page, rank, payload, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(category, id) DO UPDATE SET
                page = excluded.page,
                rank = excluded.rank,
                payload = excluded.payload,
                fetched_at = excluded.fetched_at",
        )
        .context("failed to prepare cached_entities upsert")?;

    let mut written: usize = 0;
    for e in entities {
        let rows = stmt
            .execute(rusqlite::params![
                e.category,
                e.id,
                e.page,
                e.rank,
                e.payload,
                e.fetched_at,
            ])
            .with_context(|| format!("failed to upsert entity {} in {}", e.id, e.category))?;
        written = written.saturating_add(rows);
    }

    drop(stmt);
    tx.commit().context("failed to commit cached_entities upsert")?;
    Ok(written)
}

/// Maps a `cached_entities` row.
fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedEntity> {
    Ok(CachedEntity {
        category: row.get(0)?,
        id: row.get(1)?,
        page: row.get(2)?,
        rank: row.get(3)?,
        payload: row.get(4)?,
        fetched_at: row.get(5)?,
    })
}

/// Loads all entities of a category ordered by `(page, rank)`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn load_entities(conn: &Connection, category: &str) -> Result<Vec<CachedEntity>> {
    load_entities_up_to(conn, category, u32::MAX)
}

/// Loads entities of a category on pages `1..=max_page`, ordered by `(page, rank)`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn load_entities_up_to(
    conn: &Connection,
    category: &str,
    max_page: u32,
) -> Result<Vec<CachedEntity>> {
    let mut stmt = conn
        .prepare(
            "SELECT category, id, page, rank, payload, fetched_at
             FROM cached_entities
             WHERE category = ?1 AND page <= ?2
             ORDER BY page, rank",
        )
        .context("failed to prepare cached_entities query")?;

    let rows = stmt
        .query_map(rusqlite::params![category, max_page], row_to_entity)
        .with_context(|| format!("failed to query cached_entities for {category}"))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to read cached_entities rows")
}

/// Deletes every entity of a category. Returns the number of rows deleted.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_entities(conn: &Connection, category: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM cached_entities WHERE category = ?1",
        [category],
    )
    .with_context(|| format!("failed to clear cached_entities for {category}"))
}

/// Deletes every entity whose category key lives under `namespace`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_entities_in_namespace(conn: &Connection, namespace: &str) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM cached_entities WHERE {NAMESPACE_PREDICATE}"),
        [namespace],
    )
    .with_context(|| format!("failed to clear cached_entities in namespace {namespace}"))
}

/// Deletes every cached entity.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_all_entities(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM cached_entities", [])
        .context("failed to clear cached_entities")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::connection::open_db;

    fn setup_db() -> (Connection, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(Some(&dir.path().to_path_buf())).unwrap();
        (conn, dir)
    }

    fn make_entity(category: &str, id: u64, page: u32, rank: u32, payload: &str) -> CachedEntity {
        CachedEntity {
            category: String::from(category),
            id,
            page,
            rank,
            payload: String::from(payload),
            fetched_at: String::from("2024-01-01T00:00:00Z"),
        }
    }

    #[test]
    fn test_upsert_and_load_in_page_rank_order() {
        // Arrange: insert out of order
        let (conn, _dir) = setup_db();
        let entities = vec![
            make_entity("movie/popular", 30, 2, 0, "{}"),
            make_entity("movie/popular", 20, 1, 1, "{}"),
            make_entity("movie/popular", 10, 1, 0, "{}"),
        ];

        // Act
        let written = upsert_entities(&conn, &entities).unwrap();
        let loaded = load_entities(&conn, "movie/popular").unwrap();

        // Assert
        assert_eq!(written, 3);
        let ids: Vec<u64> = loaded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_upsert_same_id_overwrites() {
        // Arrange
        let (conn, _dir) = setup_db();
        upsert_entities(&conn, &[make_entity("movie/popular", 5, 1, 0, r#"{"title":"A"}"#)])
            .unwrap();

        // Act
        upsert_entities(&conn, &[make_entity("movie/popular", 5, 1, 0, r#"{"title":"B"}"#)])
            .unwrap();
        let loaded = load_entities(&conn, "movie/popular").unwrap();

        // Assert
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].payload, r#"{"title":"B"}"#);
    }

    #[test]
    fn test_same_id_in_different_categories_is_distinct() {
        // Arrange
        let (conn, _dir) = setup_db();

        // Act
        upsert_entities(
            &conn,
            &[
                make_entity("movie/popular", 5, 1, 0, "{}"),
                make_entity("movie/top_rated", 5, 1, 0, "{}"),
            ],
        )
        .unwrap();

        // Assert
        assert_eq!(load_entities(&conn, "movie/popular").unwrap().len(), 1);
        assert_eq!(load_entities(&conn, "movie/top_rated").unwrap().len(), 1);
    }

    #[test]
    fn test_load_entities_up_to_page() {
        // Arrange
        let (conn, _dir) = setup_db();
        upsert_entities(
            &conn,
            &[
                make_entity("tv/popular", 1, 1, 0, "{}"),
                make_entity("tv/popular", 2, 2, 0, "{}"),
                make_entity("tv/popular", 3, 3, 0, "{}"),
            ],
        )
        .unwrap();

        // Act
        let loaded = load_entities_up_to(&conn, "tv/popular", 2).unwrap();

        // Assert
        let ids: Vec<u64> = loaded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_delete_entities_only_touches_category() {
        // Arrange
        let (conn, _dir) = setup_db();
        upsert_entities(
            &conn,
            &[
                make_entity("movie/popular", 1, 1, 0, "{}"),
                make_entity("movie/upcoming", 2, 1, 0, "{}"),
            ],
        )
        .unwrap();

        // Act
        let deleted = delete_entities(&conn, "movie/popular").unwrap();

        // Assert
        assert_eq!(deleted, 1);
        assert!(load_entities(&conn, "movie/popular").unwrap().is_empty());
        assert_eq!(load_entities(&conn, "movie/upcoming").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_entities_in_namespace() {
        // Arrange: `movies/...` must not match the `movie` namespace
        let (conn, _dir) = setup_db();
        upsert_entities(
            &conn,
            &[
                make_entity("movie/popular", 1, 1, 0, "{}"),
                make_entity("movie/top_rated", 2, 1, 0, "{}"),
                make_entity("movies/popular", 3, 1, 0, "{}"),
                make_entity("tv/popular", 4, 1, 0, "{}"),
            ],
        )
        .unwrap();

        // Act
        let deleted = delete_entities_in_namespace(&conn, "movie").unwrap();

        // Assert
        assert_eq!(deleted, 2);
        assert_eq!(load_entities(&conn, "movies/popular").unwrap().len(), 1);
        assert_eq!(load_entities(&conn, "tv/popular").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_all_entities() {
        // Arrange
        let (conn, _dir) = setup_db();
        upsert_entities(
            &conn,
            &[
                make_entity("movie/popular", 1, 1, 0, "{}"),
                make_entity("search/all/heat", 2, 1, 0, "{}"),
            ],
        )
        .unwrap();

        // Act
        let deleted = delete_all_entities(&conn).unwrap();

        // Assert
        assert_eq!(deleted, 2);
        assert!(load_entities(&conn, "search/all/heat").unwrap().is_empty());
    }
}
