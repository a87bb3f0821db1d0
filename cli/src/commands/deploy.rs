//! `testbed deploy`: one-off repository, agent and command deployments.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::application::ports::{ErrorPolicy, ProgressReporter};
use crate::application::services::deploy::{deploy_agent, deploy_repository};
use crate::application::services::exec::{self, RemoteCommand};
use crate::application::services::provision::discover;

/// Deploy subcommands.
#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Push a deploy plan to a repository host and start the repository
    Repo(RepoArgs),
    /// Deploy agents from a repository host
    Agents(AgentsArgs),
    /// Run a command on several hosts
    Exec(ExecArgs),
}

#[derive(Args, Debug)]
pub struct RepoArgs {
    /// Deploy plan file
    #[arg(long)]
    pub plan: PathBuf,

    /// Repository host
    #[arg(long)]
    pub host: String,

    /// Working directory inside the repository container
    #[arg(long)]
    pub workdir: Option<String>,

    /// Report a failed launch instead of aborting
    #[arg(long)]
    pub ignore_errors: bool,
}

#[derive(Args, Debug)]
pub struct AgentsArgs {
    /// Repository host the agents are deployed from
    #[arg(long)]
    pub repository: String,

    /// Agent hosts
    #[arg(long, num_args = 1.., required = true)]
    pub agents: Vec<String>,

    /// Working directory inside the repository container
    #[arg(long)]
    pub workdir: Option<String>,

    /// Report nonzero exit codes instead of aborting
    #[arg(long)]
    pub ignore_errors: bool,
}

#[derive(Args, Debug)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    /// Hosts to run on, in order
    #[arg(long, num_args = 1.., required = true)]
    pub hosts: Vec<String>,

    /// Environment assignment KEY=VALUE; PATH entries are prepended to the
    /// container's PATH
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Working directory inside each container
    #[arg(long, default_value = "/")]
    pub workdir: String,

    /// Keep going on nonzero exit codes and stream output as it arrives
    #[arg(long)]
    pub ignore_errors: bool,

    /// Command to run through `sh -c`
    #[arg(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn policy(ignore_errors: bool) -> ErrorPolicy {
    if ignore_errors {
        ErrorPolicy::IgnoreErrors
    } else {
        ErrorPolicy::FailFast
    }
}

/// Run `testbed deploy <subcommand>`.
///
/// # Errors
///
/// Returns an error if a host is not running, a file is missing, or a
/// command fails under the fail-fast policy.
pub async fn run(cmd: &DeployCommand, app: &AppContext) -> Result<()> {
    let registry = discover(&app.runtime).await?;
    let reporter = app.terminal_reporter();
    match cmd {
        DeployCommand::Repo(args) => {
            let workdir = args.workdir.as_deref().unwrap_or(&app.config.workdir);
            deploy_repository(
                &app.runtime,
                &app.fs,
                &registry,
                &reporter,
                &args.host,
                &args.plan,
                workdir,
                policy(args.ignore_errors),
            )
            .await
        }
        DeployCommand::Agents(args) => {
            let workdir = args.workdir.as_deref().unwrap_or(&app.config.workdir);
            for agent in &args.agents {
                deploy_agent(
                    &app.runtime,
                    &registry,
                    &reporter,
                    agent,
                    &args.repository,
                    workdir,
                    policy(args.ignore_errors),
                )
                .await?;
            }
            Ok(())
        }
        DeployCommand::Exec(args) => {
            let command = args.command.join(" ");
            let mut failed = 0usize;
            for host in &args.hosts {
                app.output.host_banner(host, &command);
                let call = RemoteCommand {
                    host,
                    command: &command,
                    workdir: &args.workdir,
                    environment: &args.env,
                };
                let code = exec::exec(
                    &app.runtime,
                    &registry,
                    &reporter,
                    &call,
                    policy(args.ignore_errors),
                )
                .await?
                .finish(|chunk| reporter.output(chunk))
                .await?;
                if code != 0 {
                    failed += 1;
                    reporter.warn(&format!("[{command}] on {host} exited with code {code}"));
                }
            }
            if failed > 0 {
                app.output.warn(&format!(
                    "{failed} of {} hosts reported a nonzero exit code",
                    args.hosts.len()
                ));
            }
            Ok(())
        }
    }
}
