//! Database module for caching TMDB listings.
//!
//! Uses `rusqlite` (bundled `SQLite`) to persist fetched list entities
//! and per-category pagination cursors across restarts.

/// Pagination cursor persistence.
pub mod cursors;
/// Cached list entity CRUD operations.
pub mod entities;
mod connection;
mod dirs;
mod migrations;

#[allow(clippy::module_name_repetitions)]
pub use connection::{open_db, open_in_memory};
pub use cursors::{
    StoredCursor, delete_all_cursors, delete_cursor, delete_cursors_in_namespace, load_cursor,
    save_cursor,
};
pub use dirs::AppDir;
pub use entities::{
    CachedEntity, delete_all_entities, delete_entities, delete_entities_in_namespace,
    load_entities, load_entities_up_to, upsert_entities,
};
