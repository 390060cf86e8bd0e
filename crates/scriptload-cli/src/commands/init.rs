//! Write a default scripts.toml.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tracing::info!("Created {}", config_path.display());
    tracing::info!("Run 'scriptload check' to verify your scripts load.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# scriptload configuration

[site]
# Built site directory
root = "build"

# URL prefix the site is served under.
# Defaults to "/" + $CI_PROJECT_NAME, or "/" when unset.
# base = "/"

# Remote scripts: "trust" assumes they load, "reject" fails them
remote = "trust"

# Scripts every page needs. Each URL is loaded once.
[[script]]
src = "/wasm/app.js"

# [[script]]
# src = "https://cdn.example/lib.js"
# module = true
# defer = true
# integrity = "sha384-..."
# crossorigin = "anonymous"
"#;
