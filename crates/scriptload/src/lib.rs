//! Load external scripts once per URL.
//!
//! A [`ScriptLoader`] keeps a registry from script URL to the load attempt
//! for that URL. The first request for a URL inserts one `<script>` element
//! into a [`ScriptHost`] document; every later or concurrent request gets a
//! clone of the same [`LoadHandle`]. Successful loads stay cached. A failed
//! load is evicted before its waiters are woken, so the next request starts
//! a fresh attempt.
//!
//! Documents beyond the in-memory [`RecordingDocument`] sit behind features:
//! `site` (a built static site on disk, native targets only) and `web` (the
//! browser document, for `wasm32`). Neither is on by default.
//!
//! ```no_run
//! use scriptload::{RecordingDocument, ScriptLoader};
//!
//! # async fn demo() -> Result<(), scriptload::LoadError> {
//! let loader = ScriptLoader::new(RecordingDocument::new());
//! let first = loader.ensure_loaded("https://cdn.example/a.js");
//! let second = loader.ensure_loaded("https://cdn.example/a.js");
//! assert!(first.same_load(&second));
//!
//! loader.host().resolve_load("https://cdn.example/a.js");
//! first.await?;
//! # Ok(())
//! # }
//! ```

pub mod element;
pub mod error;
pub mod handle;
pub mod host;
pub mod loader;

pub use element::ScriptElement;
pub use error::LoadError;
pub use handle::{CompletionSignal, LoadHandle, LoadState};
pub use host::{RecordingDocument, Resolution, ScriptHost};
#[cfg(feature = "site")]
pub use host::{normalize_base, script_sources, RemotePolicy, SiteDocument, Target};
pub use loader::ScriptLoader;
