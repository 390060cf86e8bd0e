//! Configuration file structure (scripts.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use scriptload::{normalize_base, RemotePolicy, ScriptElement, SiteDocument};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub site: SiteConfig,

    /// Scripts every page needs
    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptElement>,
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    /// Built site directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// URL prefix the site is served under; falls back to $CI_PROJECT_NAME
    pub base: Option<String>,

    #[serde(default)]
    pub remote: RemotePolicy,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base: None,
            remote: RemotePolicy::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("build")
}

impl SiteConfig {
    /// Normalized base path after applying the environment fallback.
    pub fn base(&self) -> String {
        match &self.base {
            Some(base) => normalize_base(base),
            None => SiteDocument::base_from_env(),
        }
    }

    /// A fresh document for this site.
    pub fn document(&self) -> SiteDocument {
        SiteDocument::new(&self.root)
            .with_base(&self.base())
            .with_remote_policy(self.remote)
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }
    tracing::debug!("No {} found, using defaults", path.display());
    Ok(ConfigFile::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_scripts_and_site() {
        let config: ConfigFile = toml::from_str(
            r#"
[site]
root = "public"
base = "/game"
remote = "reject"

[[script]]
src = "/wasm/game.js"

[[script]]
src = "https://cdn.example/a.js"
module = true
async = true
"#,
        )
        .unwrap();

        assert_eq!(config.site.root, PathBuf::from("public"));
        assert_eq!(config.site.remote, RemotePolicy::Reject);
        assert_eq!(config.site.document().base(), "/game/");
        assert_eq!(config.scripts.len(), 2);
        assert!(config.scripts[1].module);
        assert!(config.scripts[1].async_load);
        assert!(!config.scripts[0].defer);
    }

    #[test]
    fn normalizes_configured_base() {
        let config: ConfigFile = toml::from_str("[site]\nbase = \"game\"\n").unwrap();

        assert_eq!(config.site.base(), "/game/");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("scripts.toml")).unwrap();

        assert_eq!(config.site.root, PathBuf::from("build"));
        assert!(config.scripts.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("scripts.toml");
        fs::write(&path, "[[script]]\nmodule = true\n").unwrap();

        assert!(load_config(&path).is_err());
    }
}
