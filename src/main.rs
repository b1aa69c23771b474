//! URL Sentinel - Main Entry Point

use clap::Parser;
use url_sentinel::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "url_sentinel=info".into()),
        )
        .init();

    run(Cli::parse())
}
