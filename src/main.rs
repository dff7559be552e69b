//! dblint-gate CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for the run.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = dblint_gate::cli::parse_cli();

    // RUST_LOG takes precedence over --log-level.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    dblint_gate::cli::run_with_cli(cli).await
}
