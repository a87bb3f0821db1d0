//! Application service: run one command inside a named container.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{
    ContainerInspector, ContainerShell, ErrorPolicy, ExecRequest, ExecStream, ProgressReporter,
};
use crate::domain::context::ContainerRegistry;
use crate::domain::env::{existing_path, merge_environment, needs_existing_path};
use crate::domain::error::ExecError;

/// A command addressed to a host by name.
#[derive(Debug, Clone, Copy)]
pub struct RemoteCommand<'a> {
    pub host: &'a str,
    pub command: &'a str,
    pub workdir: &'a str,
    /// Unmerged `KEY=VALUE` entries.
    pub environment: &'a [String],
}

/// Result of a remote command, shaped by the error policy it ran under.
pub enum RemoteOutput {
    /// Fail-fast: the command exited 0 and its output was already relayed.
    Captured { code: i32, output: String },
    /// Ignore-errors: output still to be consumed.
    Streamed(ExecStream),
}

impl RemoteOutput {
    /// Feed any remaining output to `on_chunk` and return the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream or waiting on the process fails.
    pub async fn finish(self, mut on_chunk: impl FnMut(&str)) -> Result<i32> {
        match self {
            Self::Captured { code, .. } => Ok(code),
            Self::Streamed(mut stream) => {
                while let Some(chunk) = stream.next_chunk().await {
                    on_chunk(&chunk?);
                }
                stream.exit_code().await
            }
        }
    }
}

/// Resolve the final environment for `host`.
///
/// The container is only inspected when a `PATH` entry needs its current value.
async fn resolve_environment(
    inspector: &impl ContainerInspector,
    host: &str,
    environment: &[String],
) -> Result<Vec<String>> {
    let current = if needs_existing_path(environment) {
        inspector
            .environment(host)
            .await
            .with_context(|| format!("reading environment of {host}"))?
    } else {
        Vec::new()
    };
    Ok(merge_environment(environment, existing_path(&current))?)
}

/// Run `call` on its host under `policy`.
///
/// # Errors
///
/// Returns `ExecError::UnknownHost` if the host has no running container,
/// `ExecError::NonZeroExit` for a failing command under `FailFast`, or the
/// underlying runtime error.
pub async fn exec(
    runtime: &(impl ContainerShell + ContainerInspector),
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    call: &RemoteCommand<'_>,
    policy: ErrorPolicy,
) -> Result<RemoteOutput> {
    let handle = registry
        .running(call.host)
        .ok_or_else(|| ExecError::UnknownHost(call.host.to_string()))?;
    let environment = resolve_environment(runtime, &handle.name, call.environment).await?;
    let request = ExecRequest {
        command: call.command,
        workdir: call.workdir,
        environment: &environment,
        user: None,
    };
    tracing::debug!(host = call.host, command = call.command, ?policy, "exec");

    match policy {
        ErrorPolicy::FailFast => {
            let out = runtime
                .exec(&handle.name, &request)
                .await
                .with_context(|| format!("exec on {}", call.host))?;
            let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
            output.push_str(&String::from_utf8_lossy(&out.stderr));
            if !output.is_empty() {
                reporter.output(&output);
            }
            let code = out.status.code().unwrap_or(-1);
            if code != 0 {
                return Err(ExecError::NonZeroExit {
                    host: call.host.to_string(),
                    command: call.command.to_string(),
                    code,
                }
                .into());
            }
            Ok(RemoteOutput::Captured { code, output })
        }
        ErrorPolicy::IgnoreErrors => runtime
            .exec_stream(&handle.name, &request)
            .map(RemoteOutput::Streamed)
            .with_context(|| format!("exec on {}", call.host)),
    }
}

/// Start `call` in the background, returning once it has launched.
///
/// Under `FailFast` a failed launch is an error; otherwise it is only reported.
///
/// # Errors
///
/// Returns `ExecError::UnknownHost`, `ExecError::NonZeroExit` under
/// `FailFast`, or the underlying runtime error.
pub async fn exec_detached(
    runtime: &(impl ContainerShell + ContainerInspector),
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    call: &RemoteCommand<'_>,
    policy: ErrorPolicy,
) -> Result<i32> {
    let handle = registry
        .running(call.host)
        .ok_or_else(|| ExecError::UnknownHost(call.host.to_string()))?;
    let environment = resolve_environment(runtime, &handle.name, call.environment).await?;
    let request = ExecRequest {
        command: call.command,
        workdir: call.workdir,
        environment: &environment,
        user: None,
    };
    let out = runtime
        .exec_detached(&handle.name, &request)
        .await
        .with_context(|| format!("starting [{}] on {}", call.command, call.host))?;
    let code = out.status.code().unwrap_or(-1);
    if code != 0 {
        if policy == ErrorPolicy::FailFast {
            return Err(ExecError::NonZeroExit {
                host: call.host.to_string(),
                command: call.command.to_string(),
                code,
            }
            .into());
        }
        reporter.warn(&format!(
            "[{}] on {} exited with code {code}",
            call.command, call.host
        ));
    }
    Ok(code)
}
