//! Add the configured scripts to a page's head.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scriptload::{script_sources, LoadHandle, ScriptElement, ScriptLoader, SiteDocument};

use crate::config::load_config;

/// Run the inject command.
pub async fn run(config_path: &Path, page: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let html = tokio::fs::read_to_string(&page)
        .await
        .with_context(|| format!("Failed to read {}", page.display()))?;

    let loader = ScriptLoader::new(config.site.document());
    let (rewritten, added) = inject(&loader, &html, config.scripts).await;

    let output = output.unwrap_or(page);
    tokio::fs::write(&output, rewritten)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!("Injected {} scripts into {}", added, output.display());
    Ok(())
}

/// Load `scripts` and inject the ones that loaded into `html`.
///
/// Scripts the page already references are treated as present. Returns the
/// rewritten page and the number of tags added.
pub async fn inject(
    loader: &ScriptLoader<SiteDocument>,
    html: &str,
    scripts: Vec<ScriptElement>,
) -> (String, usize) {
    let existing = script_sources(html);

    let mut requested: Vec<LoadHandle> = Vec::new();
    for element in scripts {
        if existing.contains(&element.src) {
            tracing::debug!("{} already on the page", element.src);
            continue;
        }
        let handle = loader.ensure_loaded_with(element);
        if !requested.iter().any(|h| handle.same_load(h)) {
            requested.push(handle);
        }
    }

    let mut loaded = Vec::new();
    for handle in requested {
        let url = handle.url().to_string();
        match handle.await {
            Ok(()) => loaded.push(url),
            Err(e) => tracing::warn!("Not injecting {}", e),
        }
    }

    // Attributes come from the inserted element, not the request.
    let elements: Vec<ScriptElement> = loader
        .host()
        .head()
        .into_iter()
        .filter(|e| loaded.contains(&e.src))
        .collect();

    let added = elements.len();
    (SiteDocument::inject(html, &elements), added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn injects_loaded_scripts_once() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("app.js"), "").unwrap();
        fs::write(temp.path().join("old.js"), "").unwrap();

        let loader = ScriptLoader::new(SiteDocument::new(temp.path()));
        let html = "<html><head><script src=\"/old.js\"></script></head><body></body></html>";

        let (out, added) = inject(
            &loader,
            html,
            vec![
                ScriptElement::new("/app.js").defer(),
                ScriptElement::new("/app.js"),
                ScriptElement::new("/old.js"),
                ScriptElement::new("/gone.js"),
            ],
        )
        .await;

        assert_eq!(added, 1);
        assert_eq!(
            out,
            "<html><head><script src=\"/old.js\"></script>  <script src=\"/app.js\" defer></script>\n</head><body></body></html>"
        );
        assert_eq!(loader.host().head().len(), 2);
    }
}
