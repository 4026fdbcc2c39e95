//! Shared fixtures for repository integration tests.
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use cinedex_api::tmdb::{
    FetchError, MovieDetails, PageRequest, PageResponse, PersonDetails, TmdbApi, TvShowDetails,
};
use cinedex_core::{
    CursorStore, EntityCache, EntityRecord, LanguageChangeCoordinator, LanguageProvider,
    PaginationCursor, Preferences, Settings, SqliteStore,
};
use cinedex_db::CachedEntity;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Scripted TMDB API: responses are queued per `(path, page)`.
#[derive(Debug, Default)]
pub struct MockApi {
    pages: Mutex<HashMap<(String, u32), VecDeque<Result<Value, FetchError>>>>,
    calls: Mutex<Vec<PageRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
    started: Notify,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the next answer for `path` at `page`.
    pub fn respond(&self, path: &str, page: u32, answer: Result<Value, FetchError>) {
        self.pages
            .lock()
            .unwrap()
            .entry((String::from(path), page))
            .or_default()
            .push_back(answer);
    }

    /// Makes every following fetch wait until [`release`](Self::release).
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Lets one held fetch continue.
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.notify_one();
        }
    }

    /// Resolves once a fetch has been issued.
    pub async fn started(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.started.notified())
            .await
            .unwrap();
    }

    pub fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl TmdbApi for MockApi {
    async fn fetch_page<T: DeserializeOwned + Send>(
        &self,
        request: &PageRequest,
    ) -> Result<PageResponse<T>, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        self.started.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let answer = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&(request.path.clone(), request.page))
            .and_then(VecDeque::pop_front);
        match answer {
            Some(Ok(body)) => {
                serde_json::from_value(body).map_err(|source| FetchError::Deserialization {
                    path: request.path.clone(),
                    source,
                })
            }
            Some(Err(e)) => Err(e),
            None => Err(FetchError::NotFound {
                path: request.path.clone(),
            }),
        }
    }

    async fn movie_details(&self, movie_id: u64, _: &str) -> Result<MovieDetails, FetchError> {
        Err(FetchError::NotFound {
            path: format!("movie/{movie_id}"),
        })
    }

    async fn tv_details(&self, series_id: u64, _: &str) -> Result<TvShowDetails, FetchError> {
        Err(FetchError::NotFound {
            path: format!("tv/{series_id}"),
        })
    }

    async fn person_details(&self, person_id: u64, _: &str) -> Result<PersonDetails, FetchError> {
        Err(FetchError::NotFound {
            path: format!("person/{person_id}"),
        })
    }
}

/// A movie listing page body.
pub fn movie_page(page: u32, total_pages: u32, movies: &[(u64, &str)]) -> Value {
    let results: Vec<Value> = movies
        .iter()
        .map(|(id, title)| json!({ "id": id, "title": title }))
        .collect();
    json!({ "page": page, "total_pages": total_pages, "results": results })
}

/// A TV listing page body.
pub fn tv_page(page: u32, total_pages: u32, shows: &[(u64, &str)]) -> Value {
    let results: Vec<Value> = shows
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    json!({ "page": page, "total_pages": total_pages, "results": results })
}

pub fn server_error() -> FetchError {
    FetchError::Api {
        status: 503,
        code: None,
        message: String::from("Service Unavailable"),
    }
}

/// Settings, language provider, and a started coordinator.
pub struct Harness {
    pub settings: Settings,
    pub provider: LanguageProvider,
    pub coordinator: Arc<LanguageChangeCoordinator>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn new(language: &str) -> Self {
        let settings = Settings::new(Preferences {
            language: Some(String::from(language)),
            ..Preferences::default()
        });
        let provider = LanguageProvider::new(settings.language_preference(), None);
        let coordinator = Arc::new(LanguageChangeCoordinator::new());
        let task = coordinator.start(&provider);
        Self {
            settings,
            provider,
            coordinator,
            task,
        }
    }

    /// Changes the language and waits for every listener to finish.
    pub async fn switch_language(&self, language: &str) {
        let mut applied = self.coordinator.applied();
        self.settings.set_language(Some(language));
        tokio::time::timeout(
            Duration::from_secs(5),
            applied.wait_for(|v| v.as_deref() == Some(language)),
        )
        .await
        .unwrap()
        .unwrap();
    }
}

/// Store whose reads or writes can be made to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: SqliteStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("disk I/O error");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        Ok(())
    }
}

impl EntityCache for FlakyStore {
    async fn upsert(&self, category: &str, page: u32, records: Vec<EntityRecord>) -> Result<usize> {
        self.check_write()?;
        self.inner.upsert(category, page, records).await
    }

    async fn get_all(&self, category: &str) -> Result<Vec<CachedEntity>> {
        self.check_read()?;
        self.inner.get_all(category).await
    }

    async fn get_up_to(&self, category: &str, max_page: u32) -> Result<Vec<CachedEntity>> {
        self.check_read()?;
        self.inner.get_up_to(category, max_page).await
    }

    async fn clear(&self, category: &str) -> Result<usize> {
        self.check_write()?;
        self.inner.clear(category).await
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        self.check_write()?;
        self.inner.clear_namespace(namespace).await
    }

    async fn clear_all(&self) -> Result<usize> {
        self.check_write()?;
        self.inner.clear_all().await
    }
}

impl CursorStore for FlakyStore {
    async fn get_cursor(&self, category: &str) -> Result<PaginationCursor> {
        self.check_read()?;
        self.inner.get_cursor(category).await
    }

    async fn advance(
        &self,
        category: &str,
        page: u32,
        total_pages: u32,
        language: &str,
    ) -> Result<()> {
        self.check_write()?;
        self.inner.advance(category, page, total_pages, language).await
    }

    async fn reset(&self, category: &str) -> Result<PaginationCursor> {
        self.check_write()?;
        self.inner.reset(category).await
    }

    async fn reset_namespace(&self, namespace: &str) -> Result<usize> {
        self.check_write()?;
        self.inner.reset_namespace(namespace).await
    }

    async fn reset_all(&self) -> Result<usize> {
        self.check_write()?;
        self.inner.reset_all().await
    }
}
