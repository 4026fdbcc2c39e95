//! Observable load state of a category.

use crate::error::RepoError;

/// Where the items of a [`Page`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    /// Served from the local cache without a network call.
    Cache,
    /// Fetched from the remote API.
    Remote,
    /// The requested page lies past the last page; nothing was fetched.
    Exhausted,
}

/// Result of a successful `load_page` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Requested page.
    pub page: u32,
    /// Total pages known for the category.
    pub total_pages: u32,
    /// Every item on pages `1..=page`, in `(page, rank)` order.
    pub items: Vec<T>,
    /// Items of the requested page only; empty when exhausted.
    pub increment: Vec<T>,
    /// Where the increment came from.
    pub origin: PageOrigin,
}

impl<T> Page<T> {
    /// Whether another page can be requested after this one.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Load state published per category.
///
/// `Empty -> Loading -> Loaded -> LoadingMore -> Loaded | Error`
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadState<T> {
    /// Nothing loaded (initial state, or right after an invalidation).
    #[default]
    Empty,
    /// The first page is being fetched.
    Loading,
    /// The latest load succeeded.
    Loaded(Page<T>),
    /// A further page is being fetched; `items` are the ones already shown.
    LoadingMore {
        /// Page being fetched.
        page: u32,
        /// Items loaded so far.
        items: Vec<T>,
    },
    /// The latest load failed; `items` are the ones still shown.
    Error {
        /// Failure of the latest load.
        error: RepoError,
        /// Items loaded before the failure.
        items: Vec<T>,
    },
}

impl<T> LoadState<T> {
    /// Items currently displayable in this state.
    #[must_use]
    pub fn items(&self) -> &[T] {
        match self {
            Self::Empty | Self::Loading => &[],
            Self::Loaded(page) => &page.items,
            Self::LoadingMore { items, .. } | Self::Error { items, .. } => items,
        }
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading | Self::LoadingMore { .. })
    }

    /// Failure of the latest load, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&RepoError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_follow_state() {
        // Arrange
        let loaded = LoadState::Loaded(Page {
            page: 1,
            total_pages: 3,
            items: vec![1, 2],
            increment: vec![1, 2],
            origin: PageOrigin::Remote,
        });
        let failed = LoadState::Error {
            error: RepoError::RateLimited,
            items: vec![1, 2],
        };

        // Act & Assert
        assert!(LoadState::<u8>::Empty.items().is_empty());
        assert_eq!(loaded.items(), &[1, 2]);
        assert_eq!(failed.items(), &[1, 2]);
        assert_eq!(failed.error(), Some(&RepoError::RateLimited));
        assert!(LoadState::<u8>::Loading.is_loading());
        assert!(!loaded.is_loading());
    }

    #[test]
    fn test_has_more() {
        // Arrange
        let page = Page::<u8> {
            page: 3,
            total_pages: 3,
            items: Vec::new(),
            increment: Vec::new(),
            origin: PageOrigin::Cache,
        };

        // Act & Assert
        assert!(!page.has_more());
    }
}
