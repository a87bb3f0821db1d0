//! `testbed build`: (re)provision containers from a containers file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{ErrorPolicy, TopologySource};
use crate::application::services::provision::{BuildOptions, build_containers, discover};
use crate::domain::context::KeyStore;

/// Arguments for the build command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Containers file
    #[arg(long)]
    pub containers: Option<PathBuf>,

    /// Rebuild only these hosts
    #[arg(long, num_args = 1..)]
    pub hosts: Option<Vec<String>>,

    /// Report nonzero exit codes of bootstrap commands instead of aborting
    #[arg(long)]
    pub ignore_errors: bool,
}

/// Run `testbed build`.
///
/// # Errors
///
/// Returns an error if the containers file is invalid or provisioning fails.
pub async fn run(args: &BuildArgs, app: &AppContext) -> Result<()> {
    let path = args
        .containers
        .clone()
        .unwrap_or_else(|| PathBuf::from(&app.config.containers));
    let specs = app.topology.containers(&path)?;
    let reporter = app.terminal_reporter();

    let mut registry = discover(&app.runtime).await?;
    let mut keys = KeyStore::default();
    build_containers(
        &app.runtime,
        &app.fs,
        &reporter,
        &specs,
        BuildOptions {
            hosts: args.hosts.as_deref(),
            policy: if args.ignore_errors {
                ErrorPolicy::IgnoreErrors
            } else {
                ErrorPolicy::FailFast
            },
        },
        &mut registry,
        &mut keys,
    )
    .await?;

    app.output.success("containers have been built");
    Ok(())
}
