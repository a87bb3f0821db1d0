//! `testbed up`: set the test environment up to a level.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use testbed_common::StageLevel;

use crate::app::AppContext;
use crate::application::ports::{CheckpointStore, ErrorPolicy};
use crate::application::services::orchestrate::{Orchestrator, Pipeline, RunOptions};
use crate::application::services::provision::discover;
use crate::domain::config::TestbedConfig;
use crate::domain::context::KeyStore;
use crate::infra::database::PostgresProvisioner;
use crate::infra::images::DockerImageBuilder;

/// Arguments for the up command.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Highest level to set up
    #[arg(long, value_enum, default_value_t = StageLevel::Services)]
    pub level: StageLevel,

    /// Bypass every level up to and including this one
    #[arg(long, value_enum)]
    pub skip_level: Option<StageLevel>,

    /// Skip the levels the last run completed
    #[arg(long, conflicts_with = "skip_level")]
    pub resume: bool,

    /// Report nonzero exit codes of container bootstrap and deploy commands
    /// instead of aborting
    #[arg(long)]
    pub ignore_errors: bool,

    /// Networks file
    #[arg(long)]
    pub networks: Option<PathBuf>,

    /// Images file; Dockerfile paths are relative to its directory
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Containers file
    #[arg(long)]
    pub containers: Option<PathBuf>,

    /// Database config files
    #[arg(long, num_args = 1..)]
    pub databases: Option<Vec<PathBuf>>,

    /// Repository deploy plans, paired with --repository-hosts
    #[arg(long, num_args = 1..)]
    pub deploy_plans: Option<Vec<PathBuf>>,

    /// Repository hosts
    #[arg(long, num_args = 1..)]
    pub repository_hosts: Option<Vec<String>>,

    /// Agent hosts
    #[arg(long, num_args = 1..)]
    pub agents: Option<Vec<String>>,

    /// Repository working directory inside its container
    #[arg(long)]
    pub workdir: Option<String>,

    /// Seconds to wait for agents before deploying services
    #[arg(long)]
    pub grace_period: Option<u64>,
}

impl UpArgs {
    /// Defaults from `config`, overridden by any flag given.
    #[must_use]
    pub fn pipeline(&self, config: &TestbedConfig) -> Pipeline {
        let paths = |v: &[String]| v.iter().map(PathBuf::from).collect::<Vec<_>>();
        Pipeline {
            networks: self
                .networks
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.networks)),
            images: self
                .images
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.images)),
            containers: self
                .containers
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.containers)),
            databases: self
                .databases
                .clone()
                .unwrap_or_else(|| paths(&config.databases)),
            deploy_plans: self
                .deploy_plans
                .clone()
                .unwrap_or_else(|| paths(&config.repository.deploy_plans)),
            repository_hosts: self
                .repository_hosts
                .clone()
                .unwrap_or_else(|| config.repository.hosts.clone()),
            agents: self.agents.clone().unwrap_or_else(|| config.agents.clone()),
            workdir: self.workdir.clone().unwrap_or_else(|| config.workdir.clone()),
            grace_period: Duration::from_secs(
                self.grace_period.unwrap_or(config.grace_period_secs),
            ),
            service_deploy: config.service_deploy.clone(),
        }
    }

    fn policy(&self) -> ErrorPolicy {
        if self.ignore_errors {
            ErrorPolicy::IgnoreErrors
        } else {
            ErrorPolicy::FailFast
        }
    }
}

/// Run `testbed up`.
///
/// # Errors
///
/// Returns a `StageError` naming the level that failed.
pub async fn run(args: &UpArgs, app: &AppContext) -> Result<()> {
    let started = Instant::now();
    let skip = if args.resume {
        let checkpoint = app
            .checkpoints
            .load()
            .await
            .context("loading checkpoint")?;
        checkpoint.map(|c| c.completed)
    } else {
        args.skip_level
    };
    if let Some(level) = skip {
        tracing::info!(%level, "skipping levels up to and including");
    }

    let pipeline = args.pipeline(&app.config);
    let reporter = app.terminal_reporter();
    let grace = app.grace();
    let images = DockerImageBuilder::new(&app.runtime, &app.fs, &reporter);
    let databases = PostgresProvisioner::new(
        &app.runtime,
        &app.fs,
        &reporter,
        PathBuf::from(&app.config.database.script),
    );
    let orchestrator = Orchestrator {
        runtime: &app.runtime,
        local_fs: &app.fs,
        topology: &app.topology,
        images: &images,
        databases: &databases,
        grace: &grace,
        checkpoints: &app.checkpoints,
        reporter: &reporter,
    };

    let mut registry = discover(&app.runtime).await?;
    let mut keys = KeyStore::default();
    let levels = orchestrator
        .run(
            &pipeline,
            RunOptions {
                target: args.level,
                skip,
                policy: args.policy(),
            },
            &mut registry,
            &mut keys,
        )
        .await?;

    if levels.is_empty() {
        app.output.warn(&format!(
            "nothing to do: level [{}] is already set",
            args.level
        ));
    }
    app.output.elapsed(started.elapsed());
    Ok(())
}
