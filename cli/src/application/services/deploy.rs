//! Application service: repository, agent and service deployment.
//!
//! Every action runs on the repository host; agents are addressed by name in
//! the command line, never exec'd into directly.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::application::ports::{
    ContainerInspector, ContainerShell, CopyOptions, ErrorPolicy, FileTransfer, LocalFs,
    ProgressReporter,
};
use crate::application::services::exec::{self, RemoteCommand};
use crate::domain::config::ServiceDeployConfig;
use crate::domain::context::ContainerRegistry;
use crate::domain::error::ConfigError;

/// File name of the deploy plan inside the repository working directory.
pub const DEPLOY_PLAN_NAME: &str = "deploy-repository.json";
/// Starts the repository service; runs detached.
pub const START_REPOSITORY_COMMAND: &str = "npm run startRepo";

/// Command run on the repository host to deploy an agent onto `agent`.
#[must_use]
pub fn agent_deploy_command(agent: &str) -> String {
    format!(
        "./bin/deploy_host.py --repo-deploy-file ./{DEPLOY_PLAN_NAME} --host-name {agent} --os-user root"
    )
}

fn require_host(registry: &ContainerRegistry, host: &str) -> Result<(), ConfigError> {
    if registry.is_running(host) {
        Ok(())
    } else {
        Err(ConfigError::UnknownHost(host.to_string()))
    }
}

/// Push `plan` into `host` and start the repository service there.
///
/// Only the launch is awaited, not the service itself.
///
/// # Errors
///
/// Returns a `ConfigError` if the host is not running or the plan file is
/// missing, and `ExecError::NonZeroExit` for a failed launch under `FailFast`.
#[allow(clippy::too_many_arguments)]
pub async fn deploy_repository(
    runtime: &(impl ContainerShell + ContainerInspector + FileTransfer),
    local_fs: &impl LocalFs,
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    host: &str,
    plan: &Path,
    workdir: &str,
    policy: ErrorPolicy,
) -> Result<()> {
    let started = Instant::now();
    require_host(registry, host)?;
    if !local_fs.exists(plan) {
        return Err(ConfigError::MissingFile(plan.display().to_string()).into());
    }
    reporter.step(&format!("deploying repository on {host}..."));
    let target = format!("{workdir}/{DEPLOY_PLAN_NAME}");
    runtime
        .copy_into(host, plan, &target, &CopyOptions::default())
        .await
        .with_context(|| format!("copying deploy plan {} to {host}", plan.display()))?;

    let call = RemoteCommand {
        host,
        command: START_REPOSITORY_COMMAND,
        workdir,
        environment: &[],
    };
    exec::exec_detached(runtime, registry, reporter, &call, policy).await?;
    reporter.success(&format!(
        "repository has been deployed on container {host} in {:.1}s",
        started.elapsed().as_secs_f64()
    ));
    Ok(())
}

/// Run `command` on the repository host and relay its output.
async fn run_on_repository(
    runtime: &(impl ContainerShell + ContainerInspector),
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    call: &RemoteCommand<'_>,
    policy: ErrorPolicy,
) -> Result<i32> {
    let code = exec::exec(runtime, registry, reporter, call, policy)
        .await?
        .finish(|chunk| reporter.output(chunk))
        .await?;
    if code != 0 {
        reporter.warn(&format!(
            "[{}] on {} exited with code {code}",
            call.command, call.host
        ));
    }
    Ok(code)
}

/// Deploy an agent onto `agent` from `repository`.
///
/// # Errors
///
/// Returns a `ConfigError` if either host is not running, and
/// `ExecError::NonZeroExit` for a failure under `FailFast`.
pub async fn deploy_agent(
    runtime: &(impl ContainerShell + ContainerInspector),
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    agent: &str,
    repository: &str,
    workdir: &str,
    policy: ErrorPolicy,
) -> Result<()> {
    let started = Instant::now();
    require_host(registry, agent)?;
    require_host(registry, repository)?;
    reporter.step(&format!(
        "deploying agent on container {agent} from the repository {repository}..."
    ));
    let command = agent_deploy_command(agent);
    let call = RemoteCommand {
        host: repository,
        command: &command,
        workdir,
        environment: &[],
    };
    if run_on_repository(runtime, registry, reporter, &call, policy).await? == 0 {
        reporter.success(&format!(
            "agent deployed on container {agent} in {:.1}s",
            started.elapsed().as_secs_f64()
        ));
    }
    Ok(())
}

/// Deploy application services onto `agent` through `repository`.
///
/// # Errors
///
/// Returns `ExecError::UnknownHost` if the repository host is not running,
/// and `ExecError::NonZeroExit` for a failure under `FailFast`.
#[allow(clippy::too_many_arguments)]
pub async fn deploy_services(
    runtime: &(impl ContainerShell + ContainerInspector),
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    agent: &str,
    repository: &str,
    template: &ServiceDeployConfig,
    workdir: &str,
    policy: ErrorPolicy,
) -> Result<()> {
    let command = template.command_for(agent);
    reporter.step(&format!("deploying services on {agent}..."));
    let call = RemoteCommand {
        host: repository,
        command: &command,
        workdir,
        environment: &template.environment,
    };
    run_on_repository(runtime, registry, reporter, &call, policy).await?;
    Ok(())
}
