//! The deduplicating script loader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::element::ScriptElement;
use crate::handle::{CompletionSignal, LoadHandle, LoadState};
use crate::host::ScriptHost;

/// A registry slot: the shared handle plus the id of the attach action that
/// created it.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) handle: LoadHandle,
}

/// URL to in-flight-or-loaded handle.
pub(crate) type Registry = Mutex<HashMap<String, Entry>>;

/// Lock the registry, recovering from a poisoned lock.
///
/// Entries are inserted and removed whole, so a panic elsewhere cannot leave
/// one half-written.
pub(crate) fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Entry>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<H> {
    host: H,
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

/// Loads each script URL into a document at most once at a time.
///
/// Concurrent and repeated requests for a URL share one [`LoadHandle`].
/// Successful loads stay cached for the lifetime of the loader; failed loads
/// are evicted so the next request attaches a fresh element.
///
/// Cloning is cheap and clones share the registry.
pub struct ScriptLoader<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for ScriptLoader<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ScriptHost> ScriptLoader<H> {
    /// Create a loader with an empty registry attaching into `host`.
    pub fn new(host: H) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                registry: Arc::new(Mutex::new(HashMap::new())),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Ensure the script at `url` is loaded.
    ///
    /// Returns the existing handle if `url` is pending or already loaded;
    /// otherwise inserts one element into the document. Never fails here;
    /// failures surface through the handle.
    pub fn ensure_loaded(&self, url: &str) -> LoadHandle {
        self.ensure_loaded_with(ScriptElement::new(url))
    }

    /// Like [`ensure_loaded`](Self::ensure_loaded) with explicit element
    /// attributes. Attributes are ignored when `element.src` is already
    /// registered.
    pub fn ensure_loaded_with(&self, element: ScriptElement) -> LoadHandle {
        let (handle, signal) = {
            let mut entries = lock(&self.inner.registry);

            if let Some(entry) = entries.get(&element.src) {
                tracing::trace!("Reusing load for {}", element.src);
                return entry.handle.clone();
            }

            let url: Arc<str> = Arc::from(element.src.as_str());
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = watch::channel(LoadState::Pending);

            let handle = LoadHandle::new(Arc::clone(&url), rx);
            entries.insert(
                element.src.clone(),
                Entry {
                    id,
                    handle: handle.clone(),
                },
            );

            let signal =
                CompletionSignal::new(url, id, tx, Arc::downgrade(&self.inner.registry));
            (handle, signal)
        };

        // Attach outside the lock: hosts may signal synchronously.
        tracing::debug!("Attaching script {}", element.src);
        self.inner.host.attach(element, signal);

        handle
    }

    /// State of the registered load for `url`, if any.
    pub fn state(&self, url: &str) -> Option<LoadState> {
        lock(&self.inner.registry)
            .get(url)
            .map(|entry| entry.handle.state())
    }

    /// Whether `url` is pending or loaded.
    pub fn contains(&self, url: &str) -> bool {
        lock(&self.inner.registry).contains_key(url)
    }

    /// Number of registered URLs.
    pub fn len(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    /// Whether no URL is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered URLs, in no particular order.
    pub fn urls(&self) -> Vec<String> {
        lock(&self.inner.registry).keys().cloned().collect()
    }

    /// The document this loader attaches into.
    pub fn host(&self) -> &H {
        &self.inner.host
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::host::{RecordingDocument, Resolution};
    use tokio_test::{assert_pending, assert_ready, task};

    const GOOD: &str = "https://cdn.example/a.js";
    const BAD: &str = "https://cdn.example/bad.js";

    fn loader() -> ScriptLoader<RecordingDocument> {
        ScriptLoader::new(RecordingDocument::new())
    }

    #[test]
    fn concurrent_requests_share_one_attach() {
        let loader = loader();

        let handles: Vec<_> = (0..3).map(|_| loader.ensure_loaded(GOOD)).collect();

        assert_eq!(loader.host().insert_count(GOOD), 1);
        assert!(handles.iter().all(|h| h.same_load(&handles[0])));

        let mut waits: Vec<_> = handles.iter().map(|h| task::spawn(h.wait())).collect();
        for w in &mut waits {
            assert_pending!(w.poll());
        }

        assert!(loader.host().resolve_load(GOOD));

        for w in &mut waits {
            assert!(w.is_woken());
            assert_ready!(w.poll()).unwrap();
        }
    }

    #[test]
    fn distinct_urls_attach_independently() {
        let loader = loader();

        let a = loader.ensure_loaded("https://cdn.example/one.js");
        let b = loader.ensure_loaded("https://cdn.example/two.js");

        assert!(!a.same_load(&b));
        assert_eq!(loader.host().inserted().len(), 2);
        assert_eq!(loader.len(), 2);

        loader.host().resolve_error("https://cdn.example/one.js");
        assert_eq!(b.state(), LoadState::Pending);
        assert!(matches!(a.state(), LoadState::Failed(_)));
    }

    #[test]
    fn success_is_cached_without_reattaching() {
        let loader = loader();

        let first = loader.ensure_loaded(GOOD);
        loader.host().resolve_load(GOOD);

        let again = loader.ensure_loaded(GOOD);

        assert_eq!(again.state(), LoadState::Succeeded);
        assert!(again.same_load(&first));
        assert_eq!(loader.host().insert_count(GOOD), 1);
        assert_eq!(loader.state(GOOD), Some(LoadState::Succeeded));
    }

    #[test]
    fn failure_evicts_and_allows_retry() {
        let loader = loader();

        let first = loader.ensure_loaded(BAD);
        let second = loader.ensure_loaded(BAD);
        loader.host().resolve_error(BAD);

        assert!(!loader.contains(BAD));
        let err = match first.state() {
            LoadState::Failed(err) => err,
            other => panic!("expected failure, got {other}"),
        };
        assert_eq!(err.url(), BAD);
        assert_eq!(second.state(), LoadState::Failed(err));

        let retry = loader.ensure_loaded(BAD);

        assert_eq!(loader.host().insert_count(BAD), 2);
        assert!(!retry.same_load(&first));
        assert_eq!(retry.state(), LoadState::Pending);
    }

    #[test]
    fn stale_failure_does_not_evict_newer_entry() {
        let loader = loader();

        loader.ensure_loaded(BAD);
        loader.host().resolve_error(BAD);
        let retry = loader.ensure_loaded(BAD);
        loader.host().resolve_load(BAD);

        assert_eq!(retry.state(), LoadState::Succeeded);
        assert!(loader.contains(BAD));
    }

    #[test]
    fn synchronous_host_signals_without_deadlock() {
        let loader = ScriptLoader::new(RecordingDocument::resolving(Resolution::Error));

        let handle = loader.ensure_loaded(BAD);

        assert!(matches!(handle.state(), LoadState::Failed(_)));
        assert!(loader.is_empty());
    }

    #[test]
    fn element_attributes_come_from_first_request() {
        let loader = loader();

        loader.ensure_loaded_with(ScriptElement::new(GOOD).module());
        loader.ensure_loaded(GOOD);

        let inserted = loader.host().inserted();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].module);
    }

    #[tokio::test]
    async fn awaiting_handle_reports_error() {
        let loader = loader();
        let handle = loader.ensure_loaded(BAD);

        let signaller = loader.clone();
        tokio::spawn(async move {
            signaller.host().resolve_error(BAD);
        });

        let err = handle.await.unwrap_err();
        assert_eq!(err.to_string(), format!("Failed loading script at {BAD}"));
    }

    #[tokio::test]
    async fn dropped_signal_leaves_handle_pending() {
        let loader = loader();
        let handle = loader.ensure_loaded(GOOD);

        assert!(loader.host().discard(GOOD));

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), handle.wait()).await;
        assert!(waited.is_err());
        assert!(loader.contains(GOOD));
    }
}
