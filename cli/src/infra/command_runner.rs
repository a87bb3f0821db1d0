//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution, with an optional timeout that kills the child.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

use crate::application::ports::CommandRunner;

/// Timeout for short docker queries (`ps`, `inspect`, `network ls`, ...).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner`.
///
/// With a timeout, the child is killed explicitly when it fires; dropping the
/// future alone would leave the OS process running. Without one, commands run
/// until they exit.
pub struct TokioCommandRunner {
    timeout: Option<Duration>,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// A runner that waits for as long as the command takes.
    #[must_use]
    pub fn unbounded() -> Self {
        Self { timeout: None }
    }

    fn command(program: &str, args: &[&str]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn collect(&self, program: &str, mut child: Child) -> Result<Output> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let wait = async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
            Ok::<_, anyhow::Error>((status, stdout, stderr))
        };

        let (status, stdout, stderr) = match self.timeout {
            None => wait.await?,
            Some(timeout) => {
                tokio::select! {
                    result = wait => result?,
                    () = tokio::time::sleep(timeout) => {
                        let _ = child.start_kill();
                        anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
                    }
                }
            }
        };
        Ok(Output {
            status: status.with_context(|| format!("waiting for {program}"))?,
            stdout,
            stderr,
        })
    }
}

/// Read a pipe to its end; a missing or broken pipe yields what was read.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "pipe closed early");
        }
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        tracing::trace!(program, ?args, "run");
        let child = Self::command(program, args)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        self.collect(program, child).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        tracing::trace!(program, ?args, bytes = input.len(), "run with stdin");
        let mut child = Self::command(program, args)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = self.collect(program, child).await;
        let _ = stdin_task.await;
        output
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child> {
        tracing::trace!(program, ?args, "spawn");
        Self::command(program, args)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}
