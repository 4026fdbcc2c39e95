//! Language change fan-out to cache invalidators.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::{BoxFuture, join_all};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::language::LanguageProvider;

/// A transition between two distinct resolved languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageChange {
    /// Language the caches were built with.
    pub previous: String,
    /// Newly resolved language.
    pub current: String,
}

/// Something that must drop its cached content when the language changes.
///
/// Listeners are invoked concurrently and in no particular order; a
/// listener must not rely on another listener having run.
pub trait InvalidationListener: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Drops cached content built for `change.previous`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener could not invalidate its state.
    fn on_language_changed(
        self: Arc<Self>,
        change: LanguageChange,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that completed successfully.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

/// Registry entry: listeners are held weakly, the coordinator never
/// keeps a repository alive.
struct Entry {
    id: u64,
    listener: Weak<dyn InvalidationListener>,
}

type Registry = Arc<Mutex<Vec<Entry>>>;

/// Handle returned by [`LanguageChangeCoordinator::register`].
///
/// Dropping the handle (or calling [`cancel`](Self::cancel)) removes
/// the listener from the registry.
#[must_use = "dropping the registration deregisters the listener"]
pub struct Registration {
    id: u64,
    registry: Weak<Mutex<Vec<Entry>>>,
}

impl Registration {
    /// Deregisters the listener now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|entry| entry.id != self.id);
        }
    }
}

/// Broadcasts language changes to every registered invalidation listener.
///
/// One instance is shared by every repository; it is passed in explicitly
/// rather than reached through a global.
pub struct LanguageChangeCoordinator {
    registry: Registry,
    next_id: AtomicU64,
    applied: watch::Sender<Option<String>>,
}

impl fmt::Debug for LanguageChangeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageChangeCoordinator")
            .field("listeners", &self.listener_count())
            .field("applied", &*self.applied.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for LanguageChangeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageChangeCoordinator {
    /// Creates a coordinator with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            applied: watch::Sender::new(None),
        }
    }

    /// Registers a listener without taking ownership of it.
    pub fn register<L>(&self, listener: &Arc<L>) -> Registration
    where
        L: InvalidationListener + 'static,
    {
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn InvalidationListener> = weak;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry { id, listener: weak });
        tracing::debug!(id, listener = listener.name(), "invalidation listener registered");

        Registration {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }

    /// Language the caches are consistent with after the last completed round.
    ///
    /// `None` until [`start`](Self::start) has observed the initial language.
    #[must_use]
    pub fn applied(&self) -> watch::Receiver<Option<String>> {
        self.applied.subscribe()
    }

    /// Subscribes to the provider and dispatches every distinct change.
    ///
    /// The current language is captured before returning, so a change made
    /// right after this call is never mistaken for the initial value.
    /// The task ends when the settings store is dropped.
    pub fn start(self: &Arc<Self>, provider: &LanguageProvider) -> JoinHandle<()> {
        let mut stream = provider.subscribe();
        let initial = stream.latest();
        self.applied.send_replace(Some(initial.clone()));
        tracing::info!(language = %initial, "language coordinator started");

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut last = initial;
            while let Some(language) = stream.next().await {
                if language == last {
                    tracing::debug!(language = %language, "redundant language emission suppressed");
                    continue;
                }
                let change = LanguageChange {
                    previous: std::mem::replace(&mut last, language),
                    current: last.clone(),
                };
                coordinator.dispatch(change).await;
            }
            tracing::debug!("language stream closed, coordinator stopped");
        })
    }

    /// Invokes every live listener for `change` and waits for all of them.
    ///
    /// Each listener runs in its own task, so an error or a panic in one
    /// never prevents the others from running.
    #[instrument(skip_all, fields(from = %change.previous, to = %change.current))]
    pub async fn dispatch(&self, change: LanguageChange) -> DispatchReport {
        let listeners: Vec<Arc<dyn InvalidationListener>> = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.retain(|entry| entry.listener.strong_count() > 0);
            registry
                .iter()
                .filter_map(|entry| entry.listener.upgrade())
                .collect()
        };

        tracing::info!(listeners = listeners.len(), "dispatching language change");

        let tasks = listeners.into_iter().map(|listener| {
            let name = String::from(listener.name());
            let task = tokio::spawn(listener.on_language_changed(change.clone()));
            async move { (name, task.await) }
        });

        let mut report = DispatchReport::default();
        for (name, outcome) in join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => report.delivered = report.delivered.saturating_add(1),
                Ok(Err(e)) => {
                    report.failed = report.failed.saturating_add(1);
                    tracing::warn!(listener = %name, error = %e, "invalidation listener failed");
                }
                Err(e) => {
                    report.failed = report.failed.saturating_add(1);
                    tracing::error!(listener = %name, error = %e, "invalidation listener panicked");
                }
            }
        }

        self.applied.send_replace(Some(change.current));
        report
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use anyhow::bail;

    use super::*;
    use crate::settings::{Preferences, Settings};

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        seen: Mutex<Vec<LanguageChange>>,
    }

    impl InvalidationListener for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_language_changed(
            self: Arc<Self>,
            change: LanguageChange,
        ) -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen.lock().unwrap().push(change);
                Ok(())
            })
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl InvalidationListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_language_changed(
            self: Arc<Self>,
            _change: LanguageChange,
        ) -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async move { bail!("storage unavailable") })
        }
    }

    #[derive(Debug)]
    struct Panicking;

    impl InvalidationListener for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn on_language_changed(
            self: Arc<Self>,
            _change: LanguageChange,
        ) -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async move { panic!("listener bug") })
        }
    }

    fn change(from: &str, to: &str) -> LanguageChange {
        LanguageChange {
            previous: String::from(from),
            current: String::from(to),
        }
    }

    async fn wait_applied(coordinator: &LanguageChangeCoordinator, language: &str) {
        let mut applied = coordinator.applied();
        tokio::time::timeout(
            Duration::from_secs(5),
            applied.wait_for(|v| v.as_deref() == Some(language)),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_listener() {
        // Arrange
        let coordinator = LanguageChangeCoordinator::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let _ra = coordinator.register(&a);
        let _rb = coordinator.register(&b);

        // Act
        let report = coordinator.dispatch(change("en", "fr")).await;

        // Assert
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.seen.lock().unwrap()[0], change("en", "fr"));
    }

    #[tokio::test]
    async fn test_failing_listeners_do_not_block_others() {
        // Arrange
        let coordinator = LanguageChangeCoordinator::new();
        let failing = Arc::new(Failing);
        let panicking = Arc::new(Panicking);
        let counting = Arc::new(Counting::default());
        let _r1 = coordinator.register(&failing);
        let _r2 = coordinator.register(&panicking);
        let _r3 = coordinator.register(&counting);

        // Act
        let report = coordinator.dispatch(change("en", "de")).await;

        // Assert
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.applied().borrow().as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn test_dropped_registration_stops_delivery() {
        // Arrange
        let coordinator = LanguageChangeCoordinator::new();
        let listener = Arc::new(Counting::default());
        let registration = coordinator.register(&listener);

        // Act
        registration.cancel();
        let report = coordinator.dispatch(change("en", "fr")).await;

        // Assert
        assert_eq!(report.delivered, 0);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_does_not_own_listeners() {
        // Arrange
        let coordinator = LanguageChangeCoordinator::new();
        let listener = Arc::new(Counting::default());
        let _registration = coordinator.register(&listener);
        assert_eq!(coordinator.listener_count(), 1);

        // Act
        drop(listener);
        let report = coordinator.dispatch(change("en", "fr")).await;

        // Assert
        assert_eq!(coordinator.listener_count(), 0);
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_start_dispatches_distinct_changes_only() {
        // Arrange
        let settings = Settings::new(Preferences::default());
        let provider = LanguageProvider::new(settings.language_preference(), None);
        let coordinator = Arc::new(LanguageChangeCoordinator::new());
        let listener = Arc::new(Counting::default());
        let _registration = coordinator.register(&listener);
        let _task = coordinator.start(&provider);

        // Act: "en" equals the resolved fallback, so it must be suppressed
        settings.set_language(Some("en"));
        settings.set_language(Some("fr"));
        wait_applied(&coordinator, "fr").await;

        // Assert
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(listener.seen.lock().unwrap()[0], change("en", "fr"));
    }

    #[tokio::test]
    async fn test_start_publishes_initial_language() {
        // Arrange
        let settings = Settings::new(Preferences {
            language: Some(String::from("it")),
            ..Preferences::default()
        });
        let provider = LanguageProvider::new(settings.language_preference(), None);
        let coordinator = Arc::new(LanguageChangeCoordinator::new());

        // Act
        let _task = coordinator.start(&provider);

        // Assert
        assert_eq!(coordinator.applied().borrow().as_deref(), Some("it"));
    }

    #[tokio::test]
    async fn test_register_during_dispatch_is_safe() {
        // Arrange
        let coordinator = Arc::new(LanguageChangeCoordinator::new());
        let first = Arc::new(Counting::default());
        let _r1 = coordinator.register(&first);

        // Act: register concurrently with a dispatch round
        let dispatcher = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.dispatch(change("en", "fr")).await })
        };
        let second = Arc::new(Counting::default());
        let _r2 = coordinator.register(&second);
        dispatcher.await.unwrap();
        coordinator.dispatch(change("fr", "es")).await;

        // Assert
        assert_eq!(first.calls.load(Ordering::SeqCst), 2);
        assert!(second.calls.load(Ordering::SeqCst) >= 1);
    }
}
