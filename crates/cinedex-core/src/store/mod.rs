//! Local entity cache and pagination cursor store.
//!
//! Both stores are shared by every repository; families keep to their own
//! category namespace.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    CursorStore, EntityCache, EntityRecord, LocalCursorStore, LocalEntityCache, PaginationCursor,
};
