//! Pagination cursor persistence.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// A persisted pagination cursor row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCursor {
    /// Category key.
    pub category: String,
    /// Last page written.
    pub current_page: u32,
    /// Total pages reported by the API.
    pub total_pages: u32,
    /// Highest page written since the last reset.
    pub max_page: u32,
    /// Language the cached pages were fetched in.
    pub language: Option<String>,
    /// Last update timestamp (RFC 3339).
    pub updated_at: String,
}

/// Loads the cursor of a category, if one was persisted.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn load_cursor(conn: &Connection, category: &str) -> Result<Option<StoredCursor>> {
    conn.query_row(
        "SELECT category, current_page, total_pages, max_page, language, updated_at
         FROM pagination_cursors
         WHERE category = ?1",
        [category],
        |row| {
            Ok(StoredCursor {
                category: row.get(0)?,
                current_page: row.get(1)?,
                total_pages: row.get(2)?,
                max_page: row.get(3)?,
                language: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("failed to load cursor for {category}"))
}

/// Persists a cursor in a single upsert.
///
/// `max_page` only ever grows until the row is deleted, so writing a
/// smaller page never shrinks the range considered cached.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn save_cursor(
    conn: &Connection,
    category: &str,
    current_page: u32,
    total_pages: u32,
    language: Option<&str>,
    updated_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO pagination_cursors
            (category, current_page, total_pages, max_page, language, updated_at)
         VALUES (?1, ?2, ?3, ?2, ?4, ?5)
         ON CONFLICT(category) DO UPDATE SET
            current_page = excluded.current_page,
            total_pages = excluded.total_pages,
            max_page = MAX(pagination_cursors.max_page, excluded.max_page),
            language = excluded.language,
            updated_at = excluded.updated_at",
        rusqlite::params![category, current_page, total_pages, language, updated_at],
    )
    .with_context(|| format!("failed to save cursor for {category}"))?;
    Ok(())
}

/// Deletes the cursor of a category. Returns the number of rows deleted.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_cursor(conn: &Connection, category: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM pagination_cursors WHERE category = ?1",
        [category],
    )
    .with_context(|| format!("failed to delete cursor for {category}"))
}

/// Deletes every cursor whose category key lives under `namespace`.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_cursors_in_namespace(conn: &Connection, namespace: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM pagination_cursors
         WHERE substr(category, 1, length(?1) + 1) = ?1 || '/'",
        [namespace],
    )
    .with_context(|| format!("failed to delete cursors in namespace {namespace}"))
}

/// Deletes every cursor.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn delete_all_cursors(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM pagination_cursors", [])
        .context("failed to delete cursors")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::connection::open_in_memory;

    const NOW: &str = "2024-01-01T00:00:00Z";

    #[test]
    fn test_load_missing_cursor_is_none() {
        // Arrange
        let conn = open_in_memory().unwrap();

        // Act
        let cursor = load_cursor(&conn, "movie/popular").unwrap();

        // Assert
        assert!(cursor.is_none());
    }

    #[test]
    fn test_save_then_load_cursor() {
        // Arrange
        let conn = open_in_memory().unwrap();

        // Act
        save_cursor(&conn, "movie/popular", 1, 10, Some("en"), NOW).unwrap();
        let cursor = load_cursor(&conn, "movie/popular").unwrap().unwrap();

        // Assert
        assert_eq!(cursor.current_page, 1);
        assert_eq!(cursor.total_pages, 10);
        assert_eq!(cursor.max_page, 1);
        assert_eq!(cursor.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_smaller_page_keeps_max_page() {
        // Arrange
        let conn = open_in_memory().unwrap();
        save_cursor(&conn, "tv/popular", 3, 10, Some("en"), NOW).unwrap();

        // Act
        save_cursor(&conn, "tv/popular", 1, 12, Some("en"), NOW).unwrap();
        let cursor = load_cursor(&conn, "tv/popular").unwrap().unwrap();

        // Assert
        assert_eq!(cursor.current_page, 1);
        assert_eq!(cursor.total_pages, 12);
        assert_eq!(cursor.max_page, 3);
    }

    #[test]
    fn test_delete_cursor_resets_max_page() {
        // Arrange
        let conn = open_in_memory().unwrap();
        save_cursor(&conn, "tv/popular", 3, 10, None, NOW).unwrap();

        // Act
        let deleted = delete_cursor(&conn, "tv/popular").unwrap();
        save_cursor(&conn, "tv/popular", 1, 10, None, NOW).unwrap();
        let cursor = load_cursor(&conn, "tv/popular").unwrap().unwrap();

        // Assert
        assert_eq!(deleted, 1);
        assert_eq!(cursor.max_page, 1);
    }

    #[test]
    fn test_delete_cursors_in_namespace() {
        // Arrange
        let conn = open_in_memory().unwrap();
        save_cursor(&conn, "search/all/heat", 1, 4, None, NOW).unwrap();
        save_cursor(&conn, "search/movie/heat", 1, 2, None, NOW).unwrap();
        save_cursor(&conn, "movie/popular", 1, 500, None, NOW).unwrap();

        // Act
        let deleted = delete_cursors_in_namespace(&conn, "search").unwrap();

        // Assert
        assert_eq!(deleted, 2);
        assert!(load_cursor(&conn, "movie/popular").unwrap().is_some());
    }

    #[test]
    fn test_delete_all_cursors() {
        // Arrange
        let conn = open_in_memory().unwrap();
        save_cursor(&conn, "movie/popular", 1, 500, None, NOW).unwrap();
        save_cursor(&conn, "tv/popular", 1, 500, None, NOW).unwrap();

        // Act
        let deleted = delete_all_cursors(&conn).unwrap();

        // Assert
        assert_eq!(deleted, 2);
        assert!(load_cursor(&conn, "tv/popular").unwrap().is_none());
    }
}
