//! In-memory document that records inserted elements.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::element::ScriptElement;
use crate::handle::CompletionSignal;
use crate::host::ScriptHost;

/// How a [`RecordingDocument`] treats new elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Park the signal until `resolve_load`/`resolve_error` is called
    #[default]
    Manual,
    /// Fire `load` from inside `attach`
    Load,
    /// Fire `error` from inside `attach`
    Error,
}

#[derive(Debug, Default)]
struct State {
    inserted: Vec<ScriptElement>,
    parked: Vec<CompletionSignal>,
}

/// A document that keeps every inserted element and lets the caller decide
/// when each one finishes loading.
#[derive(Debug, Default)]
pub struct RecordingDocument {
    resolution: Resolution,
    state: Mutex<State>,
}

impl RecordingDocument {
    /// Create a document whose signals are fired manually.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document that settles every element as it is inserted.
    pub fn resolving(resolution: Resolution) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All inserted elements, oldest first.
    pub fn inserted(&self) -> Vec<ScriptElement> {
        self.state().inserted.clone()
    }

    /// Number of elements inserted for `url`.
    pub fn insert_count(&self, url: &str) -> usize {
        self.state().inserted.iter().filter(|e| e.src == url).count()
    }

    /// Number of elements still waiting for a signal.
    pub fn pending_count(&self) -> usize {
        self.state().parked.len()
    }

    /// Fire `load` for the oldest waiting element of `url`.
    ///
    /// Returns `false` when nothing for `url` is waiting.
    pub fn resolve_load(&self, url: &str) -> bool {
        match self.take(url) {
            Some(signal) => {
                signal.load();
                true
            }
            None => false,
        }
    }

    /// Fire `error` for the oldest waiting element of `url`.
    pub fn resolve_error(&self, url: &str) -> bool {
        match self.take(url) {
            Some(signal) => {
                signal.error_with("element reported an error");
                true
            }
            None => false,
        }
    }

    /// Drop the oldest waiting signal of `url` without firing it.
    pub fn discard(&self, url: &str) -> bool {
        self.take(url).is_some()
    }

    fn take(&self, url: &str) -> Option<CompletionSignal> {
        // Released before the caller fires; firing locks the registry.
        let mut state = self.state();
        let pos = state.parked.iter().position(|s| s.url() == url)?;
        Some(state.parked.remove(pos))
    }
}

impl ScriptHost for RecordingDocument {
    fn attach(&self, element: ScriptElement, signal: CompletionSignal) {
        self.state().inserted.push(element);

        match self.resolution {
            Resolution::Manual => self.state().parked.push(signal),
            Resolution::Load => signal.load(),
            Resolution::Error => signal.error(),
        }
    }
}
