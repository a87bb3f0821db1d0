//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared schema crate.
//! Nothing here reaches into `crate::infra`, `crate::commands` or `crate::output`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, StreamExt as _};
use testbed_common::{
    ContainerSpec, ImagesFile, NetworkConfig, NetworksFile, PortBinding, RunCheckpoint,
    VolumeBinding,
};

use crate::domain::context::{ContainerHandle, ContainerRegistry};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Parameters for starting a new detached container.
pub struct RunSpec<'a> {
    /// Container name; also used as its hostname.
    pub name: &'a str,
    pub image: &'a str,
    /// Static `hostname -> address` resolution entries.
    pub extra_hosts: &'a BTreeMap<String, String>,
    /// Container port (`"22/tcp"`) to host binding.
    pub ports: &'a BTreeMap<String, PortBinding>,
    /// `KEY=VALUE` entries.
    pub environment: &'a [String],
    /// Host path to bind spec.
    pub volumes: &'a BTreeMap<String, VolumeBinding>,
}

/// A command to run inside a container through `sh -c`.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    pub command: &'a str,
    pub workdir: &'a str,
    /// Final `KEY=VALUE` entries, already merged.
    pub environment: &'a [String],
    /// Run as this user instead of the image default.
    pub user: Option<&'a str>,
}

impl<'a> ExecRequest<'a> {
    /// A root-less request with no extra environment.
    #[must_use]
    pub fn new(command: &'a str, workdir: &'a str) -> Self {
        Self {
            command,
            workdir,
            environment: &[],
            user: None,
        }
    }
}

/// Ownership and filtering applied by `FileTransfer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions<'a> {
    /// Directory entries whose path contains any of these substrings are left out.
    pub filter: &'a [String],
    /// `user:group` for `chown -R`; `root:root` when `None`.
    pub owner: Option<&'a str>,
    /// Octal mode for `chmod -R`; left untouched when `None`.
    pub mode: Option<&'a str>,
}

/// Output of a running remote command, consumed chunk by chunk.
///
/// Finite and single-use: once drained, the chunks are gone.
pub struct ExecStream {
    chunks: BoxStream<'static, Result<String>>,
    exit: BoxFuture<'static, Result<i32>>,
}

impl ExecStream {
    #[must_use]
    pub fn new(
        chunks: BoxStream<'static, Result<String>>,
        exit: BoxFuture<'static, Result<i32>>,
    ) -> Self {
        Self { chunks, exit }
    }

    /// The next chunk of output, or `None` once both streams are closed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the command's output fails.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        self.chunks.next().await
    }

    /// Discard any unread output and wait for the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited on.
    pub async fn exit_code(mut self) -> Result<i32> {
        while let Some(chunk) = self.chunks.next().await {
            chunk?;
        }
        self.exit.await
    }
}

/// What to do when a remote command exits nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Capture the output whole and turn a nonzero exit into an error.
    FailFast,
    /// Stream the output and report the exit code without raising.
    IgnoreErrors,
}

// ── Container Runtime Port Traits ─────────────────────────────────────────────

/// Container lifecycle: list, run, remove, snapshot.
#[allow(async_fn_in_trait)]
pub trait ContainerLifecycle {
    /// All containers, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>>;
    /// Start a new detached container.
    async fn run(&self, spec: &RunSpec<'_>) -> Result<ContainerHandle>;
    /// Force-remove a container.
    async fn remove(&self, name: &str) -> Result<()>;
    /// Snapshot a container into `reference` (`image:tag`).
    async fn commit(&self, name: &str, reference: &str) -> Result<()>;
}

/// Container state inspection.
#[allow(async_fn_in_trait)]
pub trait ContainerInspector {
    /// The container's configured `KEY=VALUE` environment.
    async fn environment(&self, name: &str) -> Result<Vec<String>>;
}

/// Network operations.
#[allow(async_fn_in_trait)]
pub trait NetworkManager {
    async fn list_networks(&self) -> Result<Vec<String>>;
    async fn create_network(&self, name: &str, config: &NetworkConfig) -> Result<()>;
    async fn remove_network(&self, name: &str) -> Result<()>;
    /// Attach a container to a network, with a static address when given.
    async fn connect(&self, network: &str, container: &str, address: Option<&str>) -> Result<()>;
}

/// Local image store.
#[allow(async_fn_in_trait)]
pub trait ImageStore {
    /// Every local `repository:tag`.
    async fn list_image_tags(&self) -> Result<Vec<String>>;
    async fn remove_image(&self, reference: &str) -> Result<()>;
    /// Build `tag` from Dockerfile content with an empty context.
    async fn build_image(&self, tag: &str, dockerfile: &[u8]) -> Result<()>;
}

/// Command execution inside a container.
#[allow(async_fn_in_trait)]
pub trait ContainerShell {
    /// Run to completion and capture output.
    async fn exec(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output>;
    /// Start the command and stream its output as it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn exec_stream(&self, container: &str, request: &ExecRequest<'_>) -> Result<ExecStream>;
    /// Start the command in the background; only the launch status is returned.
    async fn exec_detached(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output>;
}

/// Host-to-container file transfer.
#[allow(async_fn_in_trait)]
pub trait FileTransfer {
    /// Copy a local file or directory to `dst` inside the container.
    async fn copy_into(
        &self,
        container: &str,
        src: &Path,
        dst: &str,
        options: &CopyOptions<'_>,
    ) -> Result<()>;
    /// Write `contents` as the file `dst` inside the container.
    async fn write_file(
        &self,
        container: &str,
        dst: &str,
        contents: &[u8],
        options: &CopyOptions<'_>,
    ) -> Result<()>;
}

/// Any type implementing all runtime sub-traits is a `ContainerRuntime`.
pub trait ContainerRuntime:
    ContainerLifecycle + ContainerInspector + NetworkManager + ImageStore + ContainerShell + FileTransfer
{
}

/// Blanket implementation: any type implementing all sub-traits is a `ContainerRuntime`.
impl<T> ContainerRuntime for T where
    T: ContainerLifecycle
        + ContainerInspector
        + NetworkManager
        + ImageStore
        + ContainerShell
        + FileTransfer
{
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// Spawn a program with piped stdout and stderr, without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Relay raw output of a remote command.
    fn output(&self, chunk: &str);
}

/// Waits out the settling period before services are deployed.
#[allow(async_fn_in_trait)]
pub trait GracePeriod {
    async fn wait(&self, period: Duration);
}

// ── Filesystem and Config Ports ───────────────────────────────────────────────

/// Abstracts host filesystem checks so services stay testable.
pub trait LocalFs {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Loads topology files. Called lazily so skipped levels never touch them.
pub trait TopologySource {
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    fn networks(&self, path: &Path) -> Result<NetworksFile>;
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    fn images(&self, path: &Path) -> Result<ImagesFile>;
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    fn containers(&self, path: &Path) -> Result<Vec<ContainerSpec>>;
}

/// Persists the highest completed level between runs.
#[allow(async_fn_in_trait)]
pub trait CheckpointStore {
    async fn load(&self) -> Result<Option<RunCheckpoint>>;
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

// ── External Collaborators ────────────────────────────────────────────────────

/// Ensures every declared image tag exists locally.
#[allow(async_fn_in_trait)]
pub trait ImageBuilder {
    /// `base_dir` anchors relative Dockerfile paths.
    async fn ensure_images(&self, images: &ImagesFile, base_dir: &Path) -> Result<()>;
}

/// Creates declared databases on already-running hosts.
#[allow(async_fn_in_trait)]
pub trait DatabaseProvisioner {
    async fn ensure_databases(
        &self,
        config_paths: &[PathBuf],
        registry: &ContainerRegistry,
    ) -> Result<()>;
}
