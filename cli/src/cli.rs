//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, OutputFlags};
use crate::commands;

/// Staged multi-host container test environments
#[derive(Parser)]
#[command(
    name = "testbed",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Defaults file (default: $TESTBED_CONFIG, then ./testbed.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Set the environment up to a level
    Up(commands::up::UpArgs),

    /// Remove declared containers and networks
    Down(commands::down::DownArgs),

    /// (Re)provision containers
    Build(commands::build::BuildArgs),

    /// Deploy a repository, agents, or run a command on hosts
    #[command(subcommand)]
    Deploy(commands::deploy::DeployCommand),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the defaults file is invalid or the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            quiet,
            no_color,
            verbose: _,
            config,
            command,
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags { no_color, quiet },
            config: config.as_deref(),
        })?;
        match command {
            Command::Up(args) => commands::up::run(&args, &app).await,
            Command::Down(args) => commands::down::run(&args, &app).await,
            Command::Build(args) => commands::build::run(&args, &app).await,
            Command::Deploy(cmd) => commands::deploy::run(&cmd, &app).await,
        }
    }
}
