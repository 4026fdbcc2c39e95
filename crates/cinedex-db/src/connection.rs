//! Database connection management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::dirs::AppDir;
use super::migrations::run_migrations;

/// Database file name inside the data directory.
const DB_FILE_NAME: &str = "cinedex.db";

/// Opens (or creates) the database and runs migrations.
///
/// - If `dir` is `Some`, uses `{dir}/cinedex.db`.
/// - Otherwise uses `cinedex.db` in the [`AppDir::Data`] directory.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrations fail.
pub fn open_db(dir: Option<&PathBuf>) -> Result<Connection> {
    let db_path = AppDir::Data.file(dir.map(PathBuf::as_path), DB_FILE_NAME)?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    run_migrations(&conn).context("database migration failed")?;
    tracing::debug!(path = %db_path.display(), "database opened");

    Ok(conn)
}

/// Opens a migrated in-memory database.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    run_migrations(&conn).context("database migration failed")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_open_db_in_temp_dir() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().join("nested");

        // Act
        let conn = open_db(Some(&dir_path)).unwrap();

        // Assert
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert!(version > 0);
        assert!(dir_path.join(DB_FILE_NAME).exists());
    }
}
