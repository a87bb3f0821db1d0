//! Application service: staged environment setup.
//!
//! Levels run in order from just after the skip level up to the target.
//! Each level is all-or-nothing: a failure stops the run and is reported with
//! the level name, and the checkpoint only advances past finished levels.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use testbed_common::{RunCheckpoint, StageLevel};

use crate::application::ports::{
    CheckpointStore, ContainerRuntime, DatabaseProvisioner, ErrorPolicy, GracePeriod,
    ImageBuilder, LocalFs, ProgressReporter, TopologySource,
};
use crate::application::services::deploy::{deploy_agent, deploy_repository, deploy_services};
use crate::application::services::networks::create_networks;
use crate::application::services::provision::{BuildOptions, build_containers};
use crate::domain::config::ServiceDeployConfig;
use crate::domain::context::{ContainerRegistry, KeyStore};
use crate::domain::error::{ConfigError, StageError};
use crate::domain::stage::plan;

/// Everything the three levels consume.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub networks: PathBuf,
    pub images: PathBuf,
    pub containers: PathBuf,
    pub databases: Vec<PathBuf>,
    /// Paired with `repository_hosts` by position, up to the shorter list.
    pub deploy_plans: Vec<PathBuf>,
    pub repository_hosts: Vec<String>,
    pub agents: Vec<String>,
    pub workdir: String,
    pub grace_period: Duration,
    pub service_deploy: ServiceDeployConfig,
}

impl Pipeline {
    /// Host that agents and services are deployed from.
    fn repository(&self) -> Result<&str, ConfigError> {
        self.repository_hosts
            .first()
            .map(String::as_str)
            .ok_or(ConfigError::NoRepositoryHost)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub target: StageLevel,
    pub skip: Option<StageLevel>,
    pub policy: ErrorPolicy,
}

/// The collaborators a run drives.
pub struct Orchestrator<'a, R, F, T, I, D, G, C, P> {
    pub runtime: &'a R,
    pub local_fs: &'a F,
    pub topology: &'a T,
    pub images: &'a I,
    pub databases: &'a D,
    pub grace: &'a G,
    pub checkpoints: &'a C,
    pub reporter: &'a P,
}

impl<R, F, T, I, D, G, C, P> Orchestrator<'_, R, F, T, I, D, G, C, P>
where
    R: ContainerRuntime,
    F: LocalFs,
    T: TopologySource,
    I: ImageBuilder,
    D: DatabaseProvisioner,
    G: GracePeriod,
    C: CheckpointStore,
    P: ProgressReporter,
{
    /// Run the planned levels and return the ones that executed.
    ///
    /// # Errors
    ///
    /// Returns a `StageError` naming the first level that failed.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        opts: RunOptions,
        registry: &mut ContainerRegistry,
        keys: &mut KeyStore,
    ) -> Result<Vec<StageLevel>> {
        let levels = plan(opts.target, opts.skip);
        for &level in &levels {
            self.run_level(level, pipeline, opts, registry, keys)
                .await
                .map_err(|source| StageError { level, source })?;
            self.checkpoints
                .save(&RunCheckpoint {
                    completed: level,
                    completed_at: Utc::now(),
                })
                .await
                .context("saving checkpoint")?;
            self.reporter
                .success(&format!("test environment has been set at [{level}] level"));
        }
        Ok(levels)
    }

    async fn run_level(
        &self,
        level: StageLevel,
        pipeline: &Pipeline,
        opts: RunOptions,
        registry: &mut ContainerRegistry,
        keys: &mut KeyStore,
    ) -> Result<()> {
        tracing::info!(%level, "starting level");
        match level {
            StageLevel::Infrastructure => {
                self.infrastructure(pipeline, opts.policy, registry, keys)
                    .await
            }
            StageLevel::ControlPlane => self.control_plane(pipeline, opts.policy, registry).await,
            StageLevel::Services => {
                let control_plane_ran = opts.skip.is_none_or(|s| s < StageLevel::ControlPlane);
                self.services(pipeline, opts.policy, registry, control_plane_ran)
                    .await
            }
        }
    }

    /// Networks, images, containers, databases, in that order.
    async fn infrastructure(
        &self,
        pipeline: &Pipeline,
        policy: ErrorPolicy,
        registry: &mut ContainerRegistry,
        keys: &mut KeyStore,
    ) -> Result<()> {
        let networks = self.topology.networks(&pipeline.networks)?;
        create_networks(self.runtime, self.reporter, &networks).await?;
        self.reporter.success("networks have been created");

        let images = self.topology.images(&pipeline.images)?;
        let images_dir = pipeline
            .images
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        self.images.ensure_images(&images, &images_dir).await?;
        self.reporter.success("images have been built");

        let specs = self.topology.containers(&pipeline.containers)?;
        build_containers(
            self.runtime,
            self.local_fs,
            self.reporter,
            &specs,
            BuildOptions {
                hosts: None,
                policy,
            },
            registry,
            keys,
        )
        .await?;

        self.databases
            .ensure_databases(&pipeline.databases, registry)
            .await
    }

    /// Start each repository, then deploy every agent from the first one.
    async fn control_plane(
        &self,
        pipeline: &Pipeline,
        policy: ErrorPolicy,
        registry: &ContainerRegistry,
    ) -> Result<()> {
        self.reporter.step("deploying repositories...");
        for (plan, host) in pipeline.deploy_plans.iter().zip(&pipeline.repository_hosts) {
            deploy_repository(
                self.runtime,
                self.local_fs,
                registry,
                self.reporter,
                host,
                plan,
                &pipeline.workdir,
                policy,
            )
            .await?;
        }
        if pipeline.agents.is_empty() {
            return Ok(());
        }
        let repository = pipeline.repository()?;
        self.reporter.step("deploying agents...");
        for agent in &pipeline.agents {
            deploy_agent(
                self.runtime,
                registry,
                self.reporter,
                agent,
                repository,
                &pipeline.workdir,
                policy,
            )
            .await?;
        }
        Ok(())
    }

    /// Optional settle wait, then services onto every agent.
    async fn services(
        &self,
        pipeline: &Pipeline,
        policy: ErrorPolicy,
        registry: &ContainerRegistry,
        control_plane_ran: bool,
    ) -> Result<()> {
        if pipeline.agents.is_empty() {
            return Ok(());
        }
        let repository = pipeline.repository()?;
        if control_plane_ran && !pipeline.grace_period.is_zero() {
            self.grace.wait(pipeline.grace_period).await;
        }
        self.reporter.step("deploying services...");
        for agent in &pipeline.agents {
            deploy_services(
                self.runtime,
                registry,
                self.reporter,
                agent,
                repository,
                &pipeline.service_deploy,
                &pipeline.workdir,
                policy,
            )
            .await?;
        }
        Ok(())
    }
}
