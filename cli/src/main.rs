//! Testbed CLI - staged multi-host container test environments

#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use testbed_cli::cli::Cli;
use testbed_cli::domain::exit_code_for;
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `TESTBED_LOG=testbed_cli=trace`.
const LOG_ENV: &str = "TESTBED_LOG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}
