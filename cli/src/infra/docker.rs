//! Infrastructure implementation of the container runtime ports.
//!
//! `DockerCli<R>` routes every runtime call through the `docker` CLI via a
//! `CommandRunner`. Short queries use `cmd_runner`; anything that runs user
//! code or moves data (`run`, `exec`, `cp`, `build`, `commit`) uses
//! `exec_runner`, which has no timeout.

use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result};
use futures_util::FutureExt as _;
use futures_util::stream::{self, BoxStream, StreamExt as _};
use testbed_common::NetworkConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::application::ports::{
    CommandRunner, ContainerInspector, ContainerLifecycle, ContainerShell, CopyOptions,
    ExecRequest, ExecStream, FileTransfer, ImageStore, NetworkManager, RunSpec,
};
use crate::domain::context::ContainerHandle;
use crate::infra::archive::{pack_bytes, pack_path, split_destination};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};

const DOCKER: &str = "docker";

/// Infrastructure adapter that routes all runtime calls through the docker CLI.
///
/// Generic over `R: CommandRunner` so that tests can inject a mock runner
/// without spawning real processes.
pub struct DockerCli<R: CommandRunner> {
    cmd_runner: R,
    exec_runner: R,
}

impl<R: CommandRunner> DockerCli<R> {
    /// Create a new adapter with explicit runner instances.
    pub fn new(cmd_runner: R, exec_runner: R) -> Self {
        Self {
            cmd_runner,
            exec_runner,
        }
    }
}

impl DockerCli<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self {
            cmd_runner: TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            exec_runner: TokioCommandRunner::unbounded(),
        }
    }
}

/// Fail with docker's stderr when the command exited nonzero.
fn check(output: Output, what: &str) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{what} failed: {}", stderr.trim())
    }
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `docker run` arguments for `spec`.
#[must_use]
pub fn run_args(spec: &RunSpec<'_>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "-t".into(),
        "--name".into(),
        spec.name.into(),
        "--hostname".into(),
        spec.name.into(),
    ];
    for (host, address) in spec.extra_hosts {
        args.push("--add-host".into());
        args.push(format!("{host}:{address}"));
    }
    for (container_port, binding) in spec.ports {
        args.push("-p".into());
        args.push(format!("{}:{container_port}", binding.host_part()));
    }
    for assignment in spec.environment {
        args.push("-e".into());
        args.push(assignment.clone());
    }
    for (host_path, binding) in spec.volumes {
        if let (Some(bind), Some(mode)) = (&binding.bind, &binding.mode) {
            args.push("-v".into());
            args.push(format!("{host_path}:{bind}:{mode}"));
        }
    }
    args.push(spec.image.into());
    args
}

/// `docker exec` arguments; the command always runs through `sh -c`.
#[must_use]
pub fn exec_args(container: &str, request: &ExecRequest<'_>, detach: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["exec".into()];
    if detach {
        args.push("-d".into());
    }
    args.push("-w".into());
    args.push(request.workdir.into());
    for assignment in request.environment {
        args.push("-e".into());
        args.push(assignment.clone());
    }
    if let Some(user) = request.user {
        args.push("-u".into());
        args.push(user.into());
    }
    args.push(container.into());
    args.push("sh".into());
    args.push("-c".into());
    args.push(request.command.into());
    args
}

/// `docker network create` arguments.
#[must_use]
pub fn network_create_args(name: &str, config: &NetworkConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "network".into(),
        "create".into(),
        "--driver".into(),
        config.driver().into(),
    ];
    if let Some((subnet, gateway)) = config.ipam() {
        args.push("--subnet".into());
        args.push(subnet.into());
        args.push("--gateway".into());
        args.push(gateway.into());
    }
    args.push(name.into());
    args
}

fn as_refs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

/// Newline-delimited chunks of a child pipe, decoded lossily so a stray byte
/// never cuts the output short. A read error ends the stream.
fn chunks<T>(reader: T) -> BoxStream<'static, Result<String>>
where
    T: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(String::from_utf8_lossy(&buf).into_owned()), Some(reader))),
            Err(e) => {
                tracing::warn!(error = %e, "command output closed early");
                None
            }
        }
    })
    .boxed()
}

impl<R: CommandRunner> DockerCli<R> {
    async fn exec_checked(&self, container: &str, command: &str) -> Result<()> {
        let args = exec_args(container, &ExecRequest::new(command, "/"), false);
        let out = self.exec_runner.run(DOCKER, &as_refs(&args)).await?;
        check(out, &format!("[{command}] on {container}")).map(|_| ())
    }

    /// Extract `archive` into `dir` inside the container, then fix ownership.
    async fn put_archive(
        &self,
        container: &str,
        dir: &str,
        archive: &[u8],
        dst: &str,
        options: &CopyOptions<'_>,
    ) -> Result<()> {
        let target = format!("{container}:{dir}");
        let out = self
            .exec_runner
            .run_with_stdin(DOCKER, &["cp", "-", &target], archive)
            .await
            .context("docker cp")?;
        check(out, &format!("copying into {target}"))?;

        let owner = options.owner.unwrap_or("root:root");
        self.exec_checked(container, &format!("chown -R {owner} {dst}"))
            .await?;
        if let Some(mode) = options.mode {
            self.exec_checked(container, &format!("chmod -R {mode} {dst}"))
                .await?;
        }
        Ok(())
    }
}

impl<R: CommandRunner> ContainerLifecycle for DockerCli<R> {
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["ps", "-a", "--format", "{{.Names}}\t{{.ID}}\t{{.State}}"])
            .await
            .context("docker ps")?;
        let out = check(out, "listing containers")?;
        Ok(stdout_lines(&out)
            .into_iter()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let (name, id) = (fields.next()?, fields.next()?);
                Some(ContainerHandle {
                    name: name.to_string(),
                    id: id.to_string(),
                    running: fields.next() == Some("running"),
                })
            })
            .collect())
    }

    async fn run(&self, spec: &RunSpec<'_>) -> Result<ContainerHandle> {
        let args = run_args(spec);
        tracing::debug!(container = spec.name, ?args, "docker run");
        let out = self
            .exec_runner
            .run(DOCKER, &as_refs(&args))
            .await
            .context("docker run")?;
        let out = check(out, &format!("starting container {}", spec.name))?;
        let id = stdout_lines(&out)
            .pop()
            .with_context(|| format!("docker run printed no id for {}", spec.name))?;
        Ok(ContainerHandle {
            name: spec.name.to_string(),
            id,
            running: true,
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["rm", "-f", name])
            .await
            .context("docker rm")?;
        check(out, &format!("removing container {name}")).map(|_| ())
    }

    async fn commit(&self, name: &str, reference: &str) -> Result<()> {
        let out = self
            .exec_runner
            .run(DOCKER, &["commit", name, reference])
            .await
            .context("docker commit")?;
        check(out, &format!("committing {name} as {reference}")).map(|_| ())
    }
}

impl<R: CommandRunner> ContainerInspector for DockerCli<R> {
    async fn environment(&self, name: &str) -> Result<Vec<String>> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["inspect", "--format", "{{json .Config.Env}}", name])
            .await
            .context("docker inspect")?;
        let out = check(out, &format!("inspecting {name}"))?;
        let env: Option<Vec<String>> = serde_json::from_slice(&out.stdout)
            .with_context(|| format!("parsing environment of {name}"))?;
        Ok(env.unwrap_or_default())
    }
}

impl<R: CommandRunner> NetworkManager for DockerCli<R> {
    async fn list_networks(&self) -> Result<Vec<String>> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["network", "ls", "--format", "{{.Name}}"])
            .await
            .context("docker network ls")?;
        Ok(stdout_lines(&check(out, "listing networks")?))
    }

    async fn create_network(&self, name: &str, config: &NetworkConfig) -> Result<()> {
        let args = network_create_args(name, config);
        let out = self
            .cmd_runner
            .run(DOCKER, &as_refs(&args))
            .await
            .context("docker network create")?;
        check(out, &format!("creating network {name}")).map(|_| ())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["network", "rm", name])
            .await
            .context("docker network rm")?;
        check(out, &format!("removing network {name}")).map(|_| ())
    }

    async fn connect(&self, network: &str, container: &str, address: Option<&str>) -> Result<()> {
        let mut args = vec!["network", "connect"];
        if let Some(ip) = address {
            args.push("--ip");
            args.push(ip);
        }
        args.push(network);
        args.push(container);
        let out = self
            .cmd_runner
            .run(DOCKER, &args)
            .await
            .context("docker network connect")?;
        check(out, &format!("connecting {container} to {network}")).map(|_| ())
    }
}

impl<R: CommandRunner> ImageStore for DockerCli<R> {
    async fn list_image_tags(&self) -> Result<Vec<String>> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["images", "--format", "{{.Repository}}:{{.Tag}}"])
            .await
            .context("docker images")?;
        Ok(stdout_lines(&check(out, "listing images")?)
            .into_iter()
            .filter(|t| !t.contains("<none>"))
            .collect())
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let out = self
            .cmd_runner
            .run(DOCKER, &["rmi", "-f", reference])
            .await
            .context("docker rmi")?;
        check(out, &format!("removing image {reference}")).map(|_| ())
    }

    async fn build_image(&self, tag: &str, dockerfile: &[u8]) -> Result<()> {
        let out = self
            .exec_runner
            .run_with_stdin(DOCKER, &["build", "-t", tag, "-"], dockerfile)
            .await
            .context("docker build")?;
        check(out, &format!("building image {tag}")).map(|_| ())
    }
}

impl<R: CommandRunner> ContainerShell for DockerCli<R> {
    async fn exec(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output> {
        let args = exec_args(container, request, false);
        self.exec_runner
            .run(DOCKER, &as_refs(&args))
            .await
            .context("docker exec")
    }

    fn exec_stream(&self, container: &str, request: &ExecRequest<'_>) -> Result<ExecStream> {
        let args = exec_args(container, request, false);
        let mut child = self
            .exec_runner
            .spawn(DOCKER, &as_refs(&args))
            .context("docker exec")?;
        let stdout = child.stdout.take().context("docker exec stdout not piped")?;
        let stderr = child.stderr.take().context("docker exec stderr not piped")?;
        let output = stream::select(chunks(stdout), chunks(stderr)).boxed();
        let exit = async move {
            let status = child.wait().await.context("waiting for docker exec")?;
            Ok::<_, anyhow::Error>(status.code().unwrap_or(-1))
        }
        .boxed();
        Ok(ExecStream::new(output, exit))
    }

    async fn exec_detached(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output> {
        let args = exec_args(container, request, true);
        self.exec_runner
            .run(DOCKER, &as_refs(&args))
            .await
            .context("docker exec -d")
    }
}

impl<R: CommandRunner> FileTransfer for DockerCli<R> {
    async fn copy_into(
        &self,
        container: &str,
        src: &Path,
        dst: &str,
        options: &CopyOptions<'_>,
    ) -> Result<()> {
        let (dir, name) = split_destination(dst);
        let src_owned = src.to_path_buf();
        let name_owned = name.to_string();
        let filter = options.filter.to_vec();
        let archive = tokio::task::spawn_blocking(move || pack_path(&src_owned, &name_owned, &filter))
            .await
            .context("archive task panicked")?
            .with_context(|| format!("packing {}", src.display()))?;
        tracing::debug!(container, src = %src.display(), dst, bytes = archive.len(), "copy");
        self.put_archive(container, dir, &archive, dst, options).await
    }

    async fn write_file(
        &self,
        container: &str,
        dst: &str,
        contents: &[u8],
        options: &CopyOptions<'_>,
    ) -> Result<()> {
        let (dir, name) = split_destination(dst);
        let archive = pack_bytes(name, contents, 0o644)?;
        self.put_archive(container, dir, &archive, dst, options).await
    }
}
