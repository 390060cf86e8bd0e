//! Load every script a site references and report the outcome.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use scriptload::{script_sources, LoadHandle, ScriptElement, ScriptLoader, SiteDocument, Target};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::load_config;

/// Outcome for one distinct script URL.
#[derive(Debug, Serialize)]
pub struct ScriptReport {
    pub url: String,
    pub loaded: bool,
    /// How many requests shared this load
    pub references: usize,
    /// Size of the local file, when the script is served by the site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a check run.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub scripts: Vec<ScriptReport>,
    /// Elements inserted into the document
    pub attached: usize,
    pub failed: usize,
}

/// Run the check command.
pub async fn run(config_path: &Path, scan: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let mut requests = config.scripts;

    if scan {
        let found = scan_pages(&config.site.root, &config.site.base())?;
        tracing::info!("Found {} script references in pages", found.len());
        requests.extend(found);
    }

    let loader = ScriptLoader::new(config.site.document());
    let report = check(&loader, requests).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for script in &report.scripts {
            match (&script.error, script.size) {
                (Some(error), _) => tracing::error!("✗ {} ({})", script.url, error),
                (None, Some(size)) => {
                    tracing::info!("✓ {} [{}]", script.url, format_size(size))
                }
                (None, None) => tracing::info!("✓ {}", script.url),
            }
        }
        tracing::info!(
            "{} scripts, {} attached, {} failed",
            report.scripts.len(),
            report.attached,
            report.failed
        );
    }

    if report.failed > 0 {
        anyhow::bail!(
            "{} of {} scripts failed to load",
            report.failed,
            report.scripts.len()
        );
    }

    Ok(())
}

/// Issue every request through `loader`, then wait for each distinct URL.
pub async fn check(
    loader: &ScriptLoader<SiteDocument>,
    requests: Vec<ScriptElement>,
) -> CheckReport {
    let mut pending: Vec<(LoadHandle, usize)> = Vec::new();

    // All requests go out before any wait so duplicates share in-flight loads.
    for element in requests {
        let handle = loader.ensure_loaded_with(element);
        match pending.iter().position(|(h, _)| h.same_load(&handle)) {
            Some(i) => pending[i].1 += 1,
            None => pending.push((handle, 1)),
        }
    }

    let mut scripts = Vec::with_capacity(pending.len());
    for (handle, references) in pending {
        let url = handle.url().to_string();
        let outcome = handle.await;

        let size = match (&outcome, loader.host().resolve(&url)) {
            (Ok(()), Target::Local(path)) => {
                tokio::fs::metadata(&path).await.ok().map(|m| m.len())
            }
            _ => None,
        };

        scripts.push(ScriptReport {
            url,
            loaded: outcome.is_ok(),
            references,
            size,
            error: outcome.err().map(|e| match e.detail() {
                Some(detail) => format!("{}: {}", e, detail),
                None => e.to_string(),
            }),
        });
    }

    CheckReport {
        failed: scripts.iter().filter(|s| !s.loaded).count(),
        attached: loader.host().head().len(),
        scripts,
    }
}

/// Collect script references from every HTML page under `root`, turning
/// page-relative sources into absolute URLs under `base`.
pub fn scan_pages(root: &Path, base: &str) -> Result<Vec<ScriptElement>> {
    if !root.exists() {
        anyhow::bail!(
            "Site root not found: {}. Build the site first.",
            root.display()
        );
    }

    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !path.is_file() || (ext != "html" && ext != "htm") {
            continue;
        }

        let html = match fs::read_to_string(path) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let page_dir = path
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(PathBuf::from)
            .unwrap_or_default();

        for src in script_sources(&html) {
            tracing::debug!("{} references {}", path.display(), src);
            found.push(ScriptElement::new(absolutize(&src, &page_dir, base)));
        }
    }

    Ok(found)
}

/// Resolve a page-relative script source to an absolute URL path.
fn absolutize(src: &str, page_dir: &Path, base: &str) -> String {
    let split = src.find(['?', '#']).unwrap_or(src.len());
    let (path, suffix) = src.split_at(split);

    // A scheme is only a scheme when it comes before the first `/`.
    let has_scheme = path
        .find(':')
        .is_some_and(|colon| !path[..colon].contains('/'));
    if src.starts_with('/') || has_scheme {
        return src.to_string();
    }

    let mut segments: Vec<String> = base
        .split('/')
        .chain(page_dir.iter().filter_map(|s| s.to_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Popping past the root leaves `..` for the site to reject.
                if segments.last().is_some_and(|s| s != "..") {
                    segments.pop();
                } else {
                    segments.push("..".to_string());
                }
            }
            other => segments.push(other.to_string()),
        }
    }

    format!("/{}{}", segments.join("/"), suffix)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn absolutizes_page_relative_sources() {
        let dir = Path::new("docs/intro");

        assert_eq!(absolutize("app.js", dir, "/"), "/docs/intro/app.js");
        assert_eq!(absolutize("./app.js", dir, "/game/"), "/game/docs/intro/app.js");
        assert_eq!(absolutize("../../wasm/a.js", dir, "/"), "/wasm/a.js");
        assert_eq!(absolutize("/abs.js", dir, "/game/"), "/abs.js");
        assert_eq!(
            absolutize("https://cdn.example/a.js", dir, "/"),
            "https://cdn.example/a.js"
        );
        assert_eq!(
            absolutize("data:text/javascript,1", dir, "/"),
            "data:text/javascript,1"
        );
    }

    #[test]
    fn keeps_urls_in_query_relative() {
        let dir = Path::new("play");

        assert_eq!(
            absolutize("app.js?next=http://x", dir, "/"),
            "/play/app.js?next=http://x"
        );
        assert_eq!(absolutize("../a.js#v=1/2", dir, "/game/"), "/game/a.js#v=1/2");
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[tokio::test]
    async fn shared_references_attach_once() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("wasm")).unwrap();
        fs::write(root.join("wasm/app.js"), "x".repeat(2048)).unwrap();
        fs::write(
            root.join("index.html"),
            r#"<head><script src="/wasm/app.js"></script><script src="missing.js"></script></head>"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("play")).unwrap();
        fs::write(
            root.join("play/index.html"),
            r#"<head><script src="../wasm/app.js"></script></head>"#,
        )
        .unwrap();

        let requests = scan_pages(root, "/").unwrap();
        assert_eq!(requests.len(), 3);

        let loader = ScriptLoader::new(SiteDocument::new(root));
        let report = check(&loader, requests).await;

        assert_eq!(report.scripts.len(), 2);
        assert_eq!(report.attached, 2);
        assert_eq!(report.failed, 1);

        let app = &report.scripts[0];
        assert_eq!(app.url, "/wasm/app.js");
        assert_eq!(app.references, 2);
        assert_eq!(app.size, Some(2048));

        let missing = &report.scripts[1];
        assert_eq!(missing.url, "/missing.js");
        assert!(!missing.loaded);
        assert!(missing
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed loading script at /missing.js"));
    }

    #[test]
    fn scan_requires_site_root() {
        let temp = tempdir().unwrap();
        assert!(scan_pages(&temp.path().join("build"), "/").is_err());
    }
}
