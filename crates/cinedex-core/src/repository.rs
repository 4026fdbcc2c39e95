//! Generic pagination repository shared by every content family.
//!
//! A repository merges three sources for each category: the remote API,
//! the local entity cache, and the persisted pagination cursor. Loads of
//! one category are serialized; a language change drops the family's
//! whole namespace and restarts the visible category from page 1.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use cinedex_api::tmdb::TmdbApi;
use futures::future::BoxFuture;
use tokio::sync::{OwnedMutexGuard, RwLock, watch};
use tracing::instrument;

use crate::coordinator::{
    InvalidationListener, LanguageChange, LanguageChangeCoordinator, Registration,
};
use crate::error::RepoError;
use crate::family::{ContentFamily, MoviesFamily, PeopleFamily, SearchFamily, TvShowsFamily};
use crate::language::LanguageProvider;
use crate::state::{LoadState, Page, PageOrigin};
use crate::store::{CursorStore, EntityCache, EntityRecord, PaginationCursor};

/// Movie lists.
pub type MovieRepository<A, S> = Repository<MoviesFamily, A, S>;
/// TV show lists.
pub type TvShowRepository<A, S> = Repository<TvShowsFamily, A, S>;
/// People lists.
pub type PeopleRepository<A, S> = Repository<PeopleFamily, A, S>;
/// Search results.
pub type SearchRepository<A, S> = Repository<SearchFamily, A, S>;

/// Per-category serialization lock and published state.
struct Slot<T> {
    lock: Arc<tokio::sync::Mutex<()>>,
    state: watch::Sender<LoadState<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            state: watch::Sender::new(LoadState::Empty),
        }
    }
}

/// Cheap-to-clone handle over one family's repository.
pub struct Repository<F: ContentFamily, A, S> {
    inner: Arc<Inner<F, A, S>>,
}

impl<F: ContentFamily, A, S> Clone for Repository<F, A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ContentFamily, A, S> fmt::Debug for Repository<F, A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("namespace", &F::NAMESPACE)
            .field("generation", &self.inner.generation.load(Ordering::Acquire))
            .field("registration", &self.inner.registration.get())
            .finish_non_exhaustive()
    }
}

/// A fetched page waiting to be written.
struct Commit {
    key: String,
    page: u32,
    total_pages: u32,
    language: String,
    generation: u64,
}

struct Inner<F: ContentFamily, A, S> {
    api: Arc<A>,
    store: Arc<S>,
    language: LanguageProvider,
    slots: Mutex<HashMap<F::Category, Arc<Slot<F::Item>>>>,
    visible: Mutex<Option<F::Category>>,
    /// Commits hold a read guard; invalidation holds the write guard.
    epoch: RwLock<()>,
    /// Bumped under the `epoch` write guard on every invalidation.
    generation: AtomicU64,
    /// Set when clearing the namespace failed; retried on the next load.
    pending_invalidation: AtomicBool,
    /// Deregisters from the coordinator when the last handle is dropped.
    registration: OnceLock<Registration>,
    _family: PhantomData<fn() -> F>,
}

impl<F, A, S> Repository<F, A, S>
where
    F: ContentFamily,
    A: TmdbApi + Send + Sync + 'static,
    S: EntityCache + CursorStore + Send + Sync + 'static,
{
    /// Creates a repository and registers it for language invalidation.
    ///
    /// The registration lives as long as the last clone of the handle.
    pub fn new(
        api: Arc<A>,
        store: Arc<S>,
        language: LanguageProvider,
        coordinator: &LanguageChangeCoordinator,
    ) -> Self {
        let inner = Arc::new(Inner {
            api,
            store,
            language,
            slots: Mutex::new(HashMap::new()),
            visible: Mutex::new(None),
            epoch: RwLock::new(()),
            generation: AtomicU64::new(0),
            pending_invalidation: AtomicBool::new(false),
            registration: OnceLock::new(),
            _family: PhantomData,
        });
        let registration = coordinator.register(&inner);
        // Freshly created, so the cell is always empty here.
        let _ = inner.registration.set(registration);
        Self { inner }
    }

    /// Loads page `page` of `category` and returns pages `1..=page`.
    ///
    /// Serves from the cache when the page is already cached in the
    /// current language, otherwise fetches it once. A second call for the
    /// same category waits for the first to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::InvalidPage`] for page 0, or the remote failure
    /// mapped into [`RepoError`]. Storage failures are never returned.
    pub async fn load_page(
        &self,
        category: &F::Category,
        page: u32,
    ) -> Result<Page<F::Item>, RepoError> {
        self.inner.load_page(category, page, false).await
    }

    /// Drops a category's cache and cursor, then loads page 1 again.
    ///
    /// # Errors
    ///
    /// Returns the remote failure mapped into [`RepoError`].
    pub async fn refresh(&self, category: &F::Category) -> Result<Page<F::Item>, RepoError> {
        self.inner.load_page(category, 1, true).await
    }

    /// Cached items of a category, without any network call.
    ///
    /// Unreadable storage yields an empty list.
    pub async fn cached(&self, category: &F::Category) -> Vec<F::Item> {
        let key = F::category_key(category);
        let cursor = self.inner.read_cursor(&key).await;
        self.inner.read_cached_items(&key, cursor.max_page).await
    }

    /// Current pagination cursor of a category.
    pub async fn cursor(&self, category: &F::Category) -> PaginationCursor {
        self.inner.read_cursor(&F::category_key(category)).await
    }

    /// Observes the load state of a category.
    #[must_use]
    pub fn watch(&self, category: &F::Category) -> watch::Receiver<LoadState<F::Item>> {
        self.inner.slot(category).state.subscribe()
    }

    /// Marks the category the caller is showing.
    ///
    /// After an invalidation, the visible category is reloaded from page 1
    /// as long as someone is watching it.
    pub fn set_visible(&self, category: Option<F::Category>) {
        *self
            .inner
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = category;
    }
}

impl<F, A, S> Inner<F, A, S>
where
    F: ContentFamily,
    A: TmdbApi + Send + Sync + 'static,
    S: EntityCache + CursorStore + Send + Sync + 'static,
{
    fn slot(&self, category: &F::Category) -> Arc<Slot<F::Item>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(category.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn all_slots(&self) -> Vec<Arc<Slot<F::Item>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Publishes `state` unless an invalidation ran since `generation`.
    fn publish(&self, slot: &Slot<F::Item>, generation: u64, state: LoadState<F::Item>) {
        if self.generation.load(Ordering::Acquire) == generation {
            slot.state.send_replace(state);
        }
    }

    async fn read_cursor(&self, key: &str) -> PaginationCursor {
        match self.store.get_cursor(key).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(category = key, error = %e, "cursor read failed, treating as empty");
                PaginationCursor::zero(key)
            }
        }
    }

    /// Cached items on pages `1..=max_page` with their page, in `(page, rank)`
    /// order. `None` on any storage or decode failure.
    async fn read_cached(&self, key: &str, max_page: u32) -> Option<Vec<(u32, F::Item)>> {
        if max_page == 0 {
            return Some(Vec::new());
        }
        let entities = match self.store.get_up_to(key, max_page).await {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(category = key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        entities
            .iter()
            .map(|entity| {
                serde_json::from_str::<F::Item>(&entity.payload).map(|item| (entity.page, item))
            })
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| {
                tracing::warn!(
                    category = key,
                    error = %e,
                    "cached payload unreadable, treating as miss"
                );
            })
            .ok()
    }

    async fn read_cached_items(&self, key: &str, max_page: u32) -> Vec<F::Item> {
        self.read_cached(key, max_page)
            .await
            .map(|entries| entries.into_iter().map(|(_, item)| item).collect())
            .unwrap_or_default()
    }

    /// Clears one category's cache and cursor. Returns `false` on failure.
    async fn clear_category(&self, key: &str) -> bool {
        let cleared = self.store.clear(key).await;
        let reset = self.store.reset(key).await;
        match (cleared, reset) {
            (Ok(_), Ok(_)) => true,
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(category = key, error = %e, "failed to clear category");
                false
            }
        }
    }

    /// Clears every category of the family. Returns `false` on failure.
    async fn clear_namespace(&self) -> bool {
        let cleared = self.store.clear_namespace(F::NAMESPACE).await;
        let reset = self.store.reset_namespace(F::NAMESPACE).await;
        match (cleared, reset) {
            (Ok(entities), Ok(cursors)) => {
                tracing::debug!(namespace = F::NAMESPACE, entities, cursors, "namespace cleared");
                true
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(namespace = F::NAMESPACE, error = %e, "failed to clear namespace");
                false
            }
        }
    }

    #[instrument(skip_all, fields(namespace = F::NAMESPACE, category = ?category, page = page))]
    async fn load_page(
        self: &Arc<Self>,
        category: &F::Category,
        page: u32,
        refresh: bool,
    ) -> Result<Page<F::Item>, RepoError> {
        if page == 0 {
            return Err(RepoError::InvalidPage { page });
        }

        let slot = self.slot(category);
        let guard = Arc::clone(&slot.lock).lock_owned().await;

        let key = F::category_key(category);
        let language = self.language.current();
        let generation = self.generation.load(Ordering::Acquire);
        let mut cursor = self.read_cursor(&key).await;
        let mut committable = true;

        if self.pending_invalidation.load(Ordering::Acquire) {
            if self.clear_namespace().await {
                self.pending_invalidation.store(false, Ordering::Release);
            } else {
                committable = false;
            }
            cursor = PaginationCursor::zero(key.as_str());
        }

        let stale = cursor
            .language
            .as_deref()
            .is_some_and(|cached| cached != language);
        if stale {
            tracing::info!(
                category = %key,
                cached = cursor.language.as_deref().unwrap_or_default(),
                current = %language,
                "cached category is in another language, dropping it"
            );
        }
        if refresh || stale {
            committable &= self.clear_category(&key).await;
            cursor = PaginationCursor::zero(key.as_str());
        }

        if cursor.is_exhausted_at(page) {
            tracing::debug!(total_pages = cursor.total_pages, "pagination exhausted");
            let result = Page {
                page,
                total_pages: cursor.total_pages,
                items: self.read_cached_items(&key, cursor.max_page).await,
                increment: Vec::new(),
                origin: PageOrigin::Exhausted,
            };
            self.publish(&slot, generation, LoadState::Loaded(result.clone()));
            return Ok(result);
        }

        // A missing cursor or a gap in the cached range is a cache miss.
        let hit = if page <= cursor.max_page {
            self.read_cached(&key, page)
                .await
                .filter(|entries| entries.iter().any(|(on_page, _)| *on_page == page))
        } else {
            None
        };
        if let Some(entries) = hit {
            tracing::debug!(count = entries.len(), "serving from cache");
            let increment = entries
                .iter()
                .filter(|(on_page, _)| *on_page == page)
                .map(|(_, item)| item.clone())
                .collect();
            let result = Page {
                page,
                total_pages: cursor.total_pages,
                items: entries.into_iter().map(|(_, item)| item).collect(),
                increment,
                origin: PageOrigin::Cache,
            };
            self.publish(&slot, generation, LoadState::Loaded(result.clone()));
            return Ok(result);
        }

        let earlier = if page > 1 {
            self.read_cached_items(&key, page.saturating_sub(1)).await
        } else {
            Vec::new()
        };
        let in_flight = if page == 1 {
            LoadState::Loading
        } else {
            LoadState::LoadingMore {
                page,
                items: earlier.clone(),
            }
        };
        self.publish(&slot, generation, in_flight);

        match self.fetch(category, page, &language).await {
            Ok((increment, total_pages)) => {
                if committable {
                    let commit = Commit {
                        key: key.clone(),
                        page,
                        total_pages,
                        language: language.clone(),
                        generation,
                    };
                    self.commit(guard, commit, &increment).await;
                } else {
                    drop(guard);
                }
                tracing::info!(
                    count = increment.len(),
                    total_pages,
                    language = %language,
                    "page fetched"
                );
                let result = Page {
                    page,
                    total_pages,
                    items: merge::<F>(earlier, &increment),
                    increment,
                    origin: PageOrigin::Remote,
                };
                self.publish(&slot, generation, LoadState::Loaded(result.clone()));
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    retryable = error.is_retryable(),
                    "page fetch failed"
                );
                self.publish(
                    &slot,
                    generation,
                    LoadState::Error {
                        error: error.clone(),
                        items: earlier,
                    },
                );
                Err(error)
            }
        }
    }

    /// Fetches and decodes one page. Returns the items and the total page count.
    async fn fetch(
        &self,
        category: &F::Category,
        page: u32,
        language: &str,
    ) -> Result<(Vec<F::Item>, u32), RepoError> {
        let request = F::page_request(category, page, language);
        let response = self.api.fetch_page::<F::Wire>(&request).await?;

        let mut items = Vec::with_capacity(response.results.len());
        for wire in response.results {
            match F::decode(category, wire) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => {
                    return Err(RepoError::Deserialization(format!("{}: {e}", request.path)));
                }
            }
        }

        // The API may report fewer pages than the one it just served.
        Ok((items, response.total_pages.max(page)))
    }

    /// Writes a fetched page and advances the cursor in one detached task.
    ///
    /// The task owns the category lock, so it completes even if the caller
    /// is dropped, and the next load of the category sees its result. It
    /// is discarded if an invalidation ran after the fetch started.
    async fn commit(
        self: &Arc<Self>,
        guard: OwnedMutexGuard<()>,
        commit: Commit,
        items: &[F::Item],
    ) {
        let records: Vec<EntityRecord> = items
            .iter()
            .filter_map(|item| match serde_json::to_string(item) {
                Ok(payload) => Some(EntityRecord {
                    id: F::item_id(item),
                    payload,
                }),
                Err(e) => {
                    tracing::warn!(
                        category = %commit.key,
                        error = %e,
                        "failed to serialize item for cache"
                    );
                    None
                }
            })
            .collect();

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            let _gate = inner.epoch.read().await;
            let Commit {
                key,
                page,
                total_pages,
                language,
                generation,
            } = commit;
            if inner.generation.load(Ordering::Acquire) != generation {
                tracing::debug!(category = %key, "invalidated during fetch, result not cached");
                return;
            }
            if let Err(e) = inner.store.upsert(&key, page, records).await {
                tracing::warn!(category = %key, error = %e, "cache write failed");
                return;
            }
            if let Err(e) = inner.store.advance(&key, page, total_pages, &language).await {
                tracing::warn!(category = %key, error = %e, "cursor write failed");
            }
        });

        if let Err(e) = task.await {
            tracing::error!(error = %e, "cache commit task failed");
        }
    }

    #[instrument(
        skip_all,
        fields(namespace = F::NAMESPACE, from = %change.previous, to = %change.current)
    )]
    async fn invalidate(self: Arc<Self>, change: LanguageChange) -> anyhow::Result<()> {
        let cleared = {
            let _gate = self.epoch.write().await;
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.clear_namespace().await
        };
        self.pending_invalidation.store(!cleared, Ordering::Release);

        for slot in self.all_slots() {
            slot.state.send_replace(LoadState::Empty);
        }

        let visible = self
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let watched = visible.filter(|category| self.slot(category).state.receiver_count() > 0);
        if let Some(category) = watched {
            tracing::debug!(category = ?category, "reloading visible category");
            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = inner.load_page(&category, 1, false).await {
                    tracing::warn!(
                        category = ?category,
                        error = %e,
                        "reload after language change failed"
                    );
                }
            });
        }

        if cleared {
            tracing::info!("cache invalidated");
            Ok(())
        } else {
            anyhow::bail!(
                "failed to clear {} cache, retrying on next load",
                F::NAMESPACE
            )
        }
    }
}

impl<F, A, S> InvalidationListener for Inner<F, A, S>
where
    F: ContentFamily,
    A: TmdbApi + Send + Sync + 'static,
    S: EntityCache + CursorStore + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        F::NAMESPACE
    }

    fn on_language_changed(
        self: Arc<Self>,
        change: LanguageChange,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self.invalidate(change))
    }
}

/// Appends `increment` to `earlier`, dropping earlier copies of the same item.
///
/// Mirrors the cache, where an item that moved to a later page is stored
/// once, on the page it was last fetched on.
fn merge<F: ContentFamily>(mut earlier: Vec<F::Item>, increment: &[F::Item]) -> Vec<F::Item> {
    let fresh: HashSet<u64> = increment.iter().map(F::item_id).collect();
    earlier.retain(|item| !fresh.contains(&F::item_id(item)));
    earlier.extend_from_slice(increment);
    earlier
}
