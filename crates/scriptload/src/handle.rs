//! Load handles and the one-shot completion signal handed to hosts.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::error::LoadError;
use crate::loader::{lock, Registry};

/// Observable state of one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Element inserted, no signal yet
    Pending,
    /// Script loaded; terminal and cached
    Succeeded,
    /// Script failed; terminal for this handle only
    Failed(LoadError),
}

impl LoadState {
    /// Whether the load has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Convert a terminal state into a result. `Pending` maps to `None`.
    pub fn into_result(self) -> Option<Result<(), LoadError>> {
        match self {
            Self::Pending => None,
            Self::Succeeded => Some(Ok(())),
            Self::Failed(err) => Some(Err(err)),
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(_) => write!(f, "failed"),
        }
    }
}

/// Shared view of a load attempt.
///
/// Clones observe the same attempt. Await the handle (or call [`wait`]) to
/// learn the outcome.
///
/// [`wait`]: LoadHandle::wait
#[derive(Debug, Clone)]
pub struct LoadHandle {
    url: Arc<str>,
    rx: watch::Receiver<LoadState>,
}

impl LoadHandle {
    pub(crate) fn new(url: Arc<str>, rx: watch::Receiver<LoadState>) -> Self {
        Self { url, rx }
    }

    /// URL this handle loads.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state without waiting.
    pub fn state(&self) -> LoadState {
        self.rx.borrow().clone()
    }

    /// Whether both handles observe the same load attempt.
    pub fn same_load(&self, other: &LoadHandle) -> bool {
        self.rx.same_channel(&other.rx)
    }

    /// Wait for the load to settle.
    ///
    /// A load whose signal is dropped without firing never settles, and
    /// neither does this future.
    pub async fn wait(&self) -> Result<(), LoadError> {
        let mut rx = self.rx.clone();
        let settled = rx.wait_for(LoadState::is_settled).await.map(|s| LoadState::clone(&s));

        match settled.ok().and_then(LoadState::into_result) {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

impl IntoFuture for LoadHandle {
    type Output = Result<(), LoadError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

/// One-shot completion token for a single attach action.
///
/// Hosts receive one with every element they insert and must consume it
/// with [`load`] or [`error`] once the environment reports the outcome.
///
/// [`load`]: CompletionSignal::load
/// [`error`]: CompletionSignal::error
#[derive(Debug)]
pub struct CompletionSignal {
    url: Arc<str>,
    id: u64,
    tx: watch::Sender<LoadState>,
    registry: Weak<Registry>,
}

impl CompletionSignal {
    pub(crate) fn new(
        url: Arc<str>,
        id: u64,
        tx: watch::Sender<LoadState>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            url,
            id,
            tx,
            registry,
        }
    }

    /// URL of the element this signal belongs to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Report a successful load. The registry entry stays cached.
    pub fn load(self) {
        tracing::debug!("Loaded script {}", self.url);
        self.tx.send_replace(LoadState::Succeeded);
    }

    /// Report a failed load.
    pub fn error(self) {
        let err = LoadError::new(&*self.url);
        self.fail(err);
    }

    /// Report a failed load with a reason from the environment.
    pub fn error_with(self, detail: impl std::fmt::Display) {
        let err = LoadError::with_detail(&*self.url, detail.to_string());
        self.fail(err);
    }

    fn fail(self, err: LoadError) {
        // Evict before settling so waiters that retry see an empty slot.
        if let Some(registry) = self.registry.upgrade() {
            let mut entries = lock(&registry);
            if entries.get(&*self.url).is_some_and(|e| e.id == self.id) {
                entries.remove(&*self.url);
            }
        }

        match err.detail() {
            Some(detail) => tracing::warn!("{}: {}", err, detail),
            None => tracing::warn!("{}", err),
        }
        self.tx.send_replace(LoadState::Failed(err));
    }
}
