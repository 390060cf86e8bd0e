//! Preview server command.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::services::ServeDir;

use crate::config::load_config;

/// Run the serve command.
pub async fn run(config_path: &Path, port: u16, open: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let base = config.site.base();
    let dir = config.site.root;

    if !dir.exists() {
        anyhow::bail!(
            "Directory not found: {}. Build the site first.",
            dir.display()
        );
    }

    let addr: SocketAddr = format!("127.0.0.1:{}", port)
        .parse()
        .context("Invalid address")?;

    let app = router(&dir, &base);

    tracing::info!("Serving {} at http://{}{}", dir.display(), addr, base);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if open {
        let url = format!("http://{}{}", addr, base);
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve `dir` under the site's base path so script URLs resolve as deployed.
fn router(dir: &Path, base: &str) -> Router {
    let service = ServeDir::new(dir);
    let prefix = base.trim_end_matches('/');

    if prefix.is_empty() {
        Router::new().fallback_service(service)
    } else {
        Router::new().nest_service(prefix, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn nests_under_configured_base() {
        let config: ConfigFile = toml::from_str("[site]\nbase = \"game\"\n").unwrap();

        let _ = router(Path::new("."), &config.site.base());
    }

    #[test]
    fn serves_root_base_as_fallback() {
        let _ = router(Path::new("."), "/");
    }
}
