//! `testbed down`: remove the declared containers and, optionally, networks.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{CheckpointStore, TopologySource};
use crate::application::services::teardown::tear_down;

/// Arguments for the down command.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Containers file
    #[arg(long)]
    pub containers: Option<PathBuf>,

    /// Also remove the networks declared in the networks file
    #[arg(long)]
    pub networks: bool,

    /// Networks file
    #[arg(long, requires = "networks")]
    pub networks_file: Option<PathBuf>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Run `testbed down`.
///
/// # Errors
///
/// Returns an error if a topology file cannot be loaded or removal fails.
pub async fn run(args: &DownArgs, app: &AppContext) -> Result<()> {
    let containers = args
        .containers
        .clone()
        .unwrap_or_else(|| PathBuf::from(&app.config.containers));
    let specs = app.topology.containers(&containers)?;
    let networks = if args.networks {
        let path = args
            .networks_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(&app.config.networks));
        Some(app.topology.networks(&path)?)
    } else {
        None
    };

    if !app.output.quiet {
        println!();
        println!("This will force-remove every container declared in {}.", containers.display());
        if networks.is_some() {
            println!("Declared networks will be removed as well.");
        }
        println!();
    }
    if !args.yes && !app.confirm("Continue?", false)? {
        println!("Cancelled.");
        return Ok(());
    }

    let reporter = app.terminal_reporter();
    let outcome = tear_down(&app.runtime, &reporter, &specs, networks.as_ref()).await?;
    app.checkpoints.clear().await?;

    if outcome.containers.is_empty() && outcome.networks.is_empty() {
        app.output.warn("nothing to remove");
    } else {
        app.output.success(&format!(
            "removed {} containers and {} networks",
            outcome.containers.len(),
            outcome.networks.len()
        ));
    }
    Ok(())
}
