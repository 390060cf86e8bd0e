//! scriptload CLI - check and inject the scripts a static site loads.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "scriptload")]
#[command(about = "Load each script of a static site once and report the outcome")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to scripts.toml config file
    #[arg(short, long, default_value = "scripts.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default scripts.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        yes: bool,
    },

    /// Load every configured script and report which ones fail
    Check {
        /// Also load every <script src> found in HTML pages under the site root
        #[arg(long)]
        scan: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add the configured scripts to a page's <head>
    Inject {
        /// HTML page to rewrite
        page: PathBuf,

        /// Write here instead of rewriting the page in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Preview the site root
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Check { scan, json } => {
            commands::check::run(&cli.config, scan, json).await?;
        }
        Commands::Inject { page, output } => {
            commands::inject::run(&cli.config, page, output).await?;
        }
        Commands::Serve { port, no_open } => {
            commands::serve::run(&cli.config, port, !no_open).await?;
        }
    }

    Ok(())
}
