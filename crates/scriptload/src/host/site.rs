//! A built static site directory acting as the document.
//!
//! Inserting an element records a `<script>` tag for the page head. The
//! load signal comes from checking that the referenced file exists under the
//! site root.

use std::path::{Component, Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use serde::Deserialize;

use crate::element::ScriptElement;
use crate::handle::CompletionSignal;
use crate::host::ScriptHost;

static HEAD_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("Invalid head regex"));

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("Invalid script src regex")
});

/// What to do with scripts hosted on another origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePolicy {
    /// Assume remote scripts load
    #[default]
    Trust,
    /// Fail every remote script
    Reject,
}

/// Where a script URL points, relative to the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// File under the site root
    Local(PathBuf),
    /// Another origin
    Remote,
    /// `data:` URL
    Inline,
    /// Cannot be served by this site
    Invalid(String),
}

/// A static site whose page head receives the inserted scripts.
#[derive(Debug)]
pub struct SiteDocument {
    root: PathBuf,
    base: String,
    remote: RemotePolicy,
    head: Mutex<Vec<ScriptElement>>,
}

impl SiteDocument {
    /// Create a document for the site built into `root`, served at `/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: "/".to_string(),
            remote: RemotePolicy::default(),
            head: Mutex::new(Vec::new()),
        }
    }

    /// Serve the site under `base` (e.g. `/game`).
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = normalize_base(base);
        self
    }

    /// Set the policy for remote scripts.
    pub fn with_remote_policy(mut self, remote: RemotePolicy) -> Self {
        self.remote = remote;
        self
    }

    /// Base path from the `CI_PROJECT_NAME` environment variable, or `/`.
    ///
    /// Project pages on CI hosts are served under `/<project>/`.
    pub fn base_from_env() -> String {
        let project = std::env::var("CI_PROJECT_NAME").unwrap_or_default();
        normalize_base(&project)
    }

    /// Site root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized base path, always starting and ending with `/`.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn head_guard(&self) -> MutexGuard<'_, Vec<ScriptElement>> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Elements inserted so far, in insertion order.
    pub fn head(&self) -> Vec<ScriptElement> {
        self.head_guard().clone()
    }

    /// Render the inserted elements, one tag per line.
    pub fn render_head(&self) -> String {
        self.head_guard()
            .iter()
            .map(ScriptElement::to_html)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inject every inserted element into `html`.
    pub fn inject_into(&self, html: &str) -> String {
        Self::inject(html, &self.head())
    }

    /// Insert `elements` into `html` before `</head>`, or at the top of the
    /// page when it has no head.
    pub fn inject(html: &str, elements: &[ScriptElement]) -> String {
        if elements.is_empty() {
            return html.to_string();
        }

        let tags = elements
            .iter()
            .map(|e| format!("  {}\n", e.to_html()))
            .collect::<String>();

        match HEAD_CLOSE_RE.find(html) {
            Some(m) => format!("{}{}{}", &html[..m.start()], tags, &html[m.start()..]),
            None => format!("{}{}", tags, html),
        }
    }

    /// Resolve a script URL against the site.
    pub fn resolve(&self, url: &str) -> Target {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let lower = path.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") || path.starts_with("//")
        {
            return Target::Remote;
        }
        if lower.starts_with("data:") {
            return Target::Inline;
        }
        if let Some(colon) = path.find(':') {
            if !path[..colon].contains('/') {
                return Target::Invalid(format!("unsupported scheme in {}", url));
            }
        }

        let relative = match path.strip_prefix('/') {
            Some(absolute) => {
                let base = self.base.trim_start_matches('/');
                match absolute.strip_prefix(base) {
                    Some(rest) => rest,
                    None => {
                        return Target::Invalid(format!("outside base path {}", self.base));
                    }
                }
            }
            None => path,
        };

        if relative.is_empty() {
            return Target::Invalid("empty path".to_string());
        }

        // Only plain segments may follow the root; `//`, `..` or a drive
        // prefix would let the join leave it.
        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Target::Invalid("path escapes site root".to_string());
        }

        Target::Local(self.root.join(relative))
    }
}

impl ScriptHost for SiteDocument {
    fn attach(&self, element: ScriptElement, signal: CompletionSignal) {
        let target = self.resolve(&element.src);
        self.head_guard().push(element);

        match target {
            Target::Remote => match self.remote {
                RemotePolicy::Trust => signal.load(),
                RemotePolicy::Reject => signal.error_with("remote scripts are rejected"),
            },
            Target::Inline => signal.load(),
            Target::Invalid(reason) => signal.error_with(reason),
            Target::Local(path) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        let meta = tokio::fs::metadata(&path).await;
                        settle(signal, &path, meta);
                    });
                }
                Err(_) => {
                    let meta = std::fs::metadata(&path);
                    settle(signal, &path, meta);
                }
            },
        }
    }
}

fn settle(signal: CompletionSignal, path: &Path, meta: std::io::Result<std::fs::Metadata>) {
    match meta {
        Ok(meta) if meta.is_file() => signal.load(),
        Ok(_) => signal.error_with(format!("{} is not a file", path.display())),
        Err(e) => signal.error_with(format!("{}: {}", path.display(), e)),
    }
}

/// Collect the `src` of every `<script>` tag in `html`, in document order.
pub fn script_sources(html: &str) -> Vec<String> {
    SCRIPT_SRC_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or(caps.get(2)).or(caps.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|src| !src.is_empty())
        .collect()
}

/// Normalize a base path so it starts and ends with `/`.
pub fn normalize_base(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
