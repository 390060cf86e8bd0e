//! Documents that script elements are attached to.

mod recording;
#[cfg(feature = "site")]
mod site;
#[cfg(feature = "web")]
pub mod web;

use crate::element::ScriptElement;
use crate::handle::CompletionSignal;

pub use recording::{RecordingDocument, Resolution};
#[cfg(feature = "site")]
pub use site::{normalize_base, script_sources, RemotePolicy, SiteDocument, Target};

/// The execution environment's document.
pub trait ScriptHost: Send + Sync {
    /// Insert `element` into the document and arrange for `signal` to be
    /// consumed once the environment reports load or error.
    ///
    /// Called at most once per attach action, never while the loader's
    /// registry is locked, so the signal may be fired before returning.
    fn attach(&self, element: ScriptElement, signal: CompletionSignal);
}
