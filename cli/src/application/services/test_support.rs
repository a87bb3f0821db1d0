//! Shared test doubles for service tests.
//!
//! `FakeRuntime` implements every runtime port plus the image, database and
//! grace-period collaborators, logging each call in order so tests can assert
//! on sequencing across all of them.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::{self, StreamExt as _};
use futures_util::FutureExt as _;
use testbed_common::{ContainerSpec, ImagesFile, NetworkConfig, NetworksFile, RunCheckpoint};

use crate::application::ports::{
    CheckpointStore, ContainerInspector, ContainerLifecycle, ContainerShell, CopyOptions,
    DatabaseProvisioner, ExecRequest, ExecStream, FileTransfer, GracePeriod, ImageBuilder,
    ImageStore, LocalFs, NetworkManager, ProgressReporter, RunSpec, TopologySource,
};
use crate::domain::context::{ContainerHandle, ContainerRegistry};
use crate::domain::ssh::READ_PUBLIC_KEY_COMMAND;

/// Build an `ExitStatus` from a logical exit code (cross-platform).
#[cfg(unix)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    std::process::ExitStatus::from_raw(code as u32)
}

pub fn output(code: i32, stdout: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// A `docker run` as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub name: String,
    pub image: String,
    pub extra_hosts: BTreeMap<String, String>,
    pub environment: Vec<String>,
}

/// A `docker exec` as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub container: String,
    pub command: String,
    pub workdir: String,
    pub environment: Vec<String>,
    pub user: Option<String>,
}

#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    pub runs: Mutex<Vec<RecordedRun>>,
    pub execs: Mutex<Vec<RecordedExec>>,
    /// `(container, path)` to file contents written via `write_file`.
    pub files: Mutex<BTreeMap<(String, String), String>>,
    pub containers: Mutex<Vec<ContainerHandle>>,
    pub networks: Mutex<BTreeSet<String>>,
    pub images: Mutex<BTreeSet<String>>,
    /// Container environment reported by `inspect`.
    pub env: BTreeMap<String, Vec<String>>,
    /// Command to exit code; anything absent exits 0.
    pub exit_codes: BTreeMap<String, i32>,
    /// Command to stdout; overrides the built-in key and keyscan replies.
    pub stdout: BTreeMap<String, String>,
    /// Operations that fail, by call-log prefix (e.g. `"connect"`).
    pub failing: BTreeSet<String>,
}

impl FakeRuntime {
    pub fn with_containers(names: &[&str]) -> Self {
        let fake = Self::default();
        *fake.containers.lock().unwrap() = names
            .iter()
            .map(|n| ContainerHandle {
                name: (*n).to_string(),
                id: format!("old-{n}"),
                running: true,
            })
            .collect();
        fake
    }

    /// Mark `names` as exited: listed by `ps -a`, but not running.
    pub fn with_stopped(self, names: &[&str]) -> Self {
        for handle in self.containers.lock().unwrap().iter_mut() {
            if names.contains(&handle.name.as_str()) {
                handle.running = false;
            }
        }
        self
    }

    pub fn with_networks(self, names: &[&str]) -> Self {
        *self.networks.lock().unwrap() = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Number of `exec`/`exec_d`/`stream` calls whose command is `command`.
    pub fn exec_count(&self, container: &str, command: &str) -> usize {
        self.execs
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.container == container && e.command == command)
            .count()
    }

    pub fn file(&self, container: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(&(container.to_string(), path.to_string()))
            .cloned()
    }

    fn record(&self, call: String) -> Result<()> {
        let fail = self.failing.iter().any(|f| call.starts_with(f.as_str()));
        self.calls.lock().unwrap().push(call.clone());
        if fail {
            anyhow::bail!("{call}: simulated failure");
        }
        Ok(())
    }

    fn record_exec(&self, container: &str, request: &ExecRequest<'_>) -> (i32, String) {
        self.execs.lock().unwrap().push(RecordedExec {
            container: container.to_string(),
            command: request.command.to_string(),
            workdir: request.workdir.to_string(),
            environment: request.environment.to_vec(),
            user: request.user.map(str::to_string),
        });
        let code = self.exit_codes.get(request.command).copied().unwrap_or(0);
        let stdout = if let Some(out) = self.stdout.get(request.command) {
            out.clone()
        } else if request.command == READ_PUBLIC_KEY_COMMAND {
            format!("ssh-rsa KEY{container} root@{container}\n")
        } else if let Some(host) = request.command.strip_prefix("ssh-keyscan -H ") {
            format!("|1|{host} ssh-ed25519 HOSTKEY{host}\n")
        } else {
            String::new()
        };
        (code, stdout)
    }
}

impl ContainerLifecycle for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>> {
        self.record("ps".to_string())?;
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn run(&self, spec: &RunSpec<'_>) -> Result<ContainerHandle> {
        self.record(format!("run {}", spec.name))?;
        self.runs.lock().unwrap().push(RecordedRun {
            name: spec.name.to_string(),
            image: spec.image.to_string(),
            extra_hosts: spec.extra_hosts.clone(),
            environment: spec.environment.to_vec(),
        });
        let mut containers = self.containers.lock().unwrap();
        anyhow::ensure!(
            containers.iter().all(|c| c.name != spec.name),
            "container name {} is already in use",
            spec.name
        );
        let handle = ContainerHandle {
            name: spec.name.to_string(),
            id: format!("new-{}-{}", spec.name, containers.len()),
            running: true,
        };
        containers.push(handle.clone());
        Ok(handle)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("rm {name}"))?;
        self.containers.lock().unwrap().retain(|c| c.name != name);
        Ok(())
    }

    async fn commit(&self, name: &str, reference: &str) -> Result<()> {
        self.record(format!("commit {name} {reference}"))?;
        self.images.lock().unwrap().insert(reference.to_string());
        Ok(())
    }
}

impl ContainerInspector for FakeRuntime {
    async fn environment(&self, name: &str) -> Result<Vec<String>> {
        self.record(format!("inspect {name}"))?;
        Ok(self.env.get(name).cloned().unwrap_or_default())
    }
}

impl NetworkManager for FakeRuntime {
    async fn list_networks(&self) -> Result<Vec<String>> {
        self.record("network ls".to_string())?;
        Ok(self.networks.lock().unwrap().iter().cloned().collect())
    }

    async fn create_network(&self, name: &str, config: &NetworkConfig) -> Result<()> {
        self.record(format!("network create {name} {}", config.driver()))?;
        self.networks.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.record(format!("network rm {name}"))?;
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }

    async fn connect(&self, network: &str, container: &str, address: Option<&str>) -> Result<()> {
        self.record(format!(
            "connect {network} {container} {}",
            address.unwrap_or("-")
        ))
    }
}

impl ImageStore for FakeRuntime {
    async fn list_image_tags(&self) -> Result<Vec<String>> {
        self.record("images".to_string())?;
        Ok(self.images.lock().unwrap().iter().cloned().collect())
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.record(format!("rmi {reference}"))?;
        self.images.lock().unwrap().remove(reference);
        Ok(())
    }

    async fn build_image(&self, tag: &str, dockerfile: &[u8]) -> Result<()> {
        self.record(format!("build {tag} {}", String::from_utf8_lossy(dockerfile)))?;
        self.images.lock().unwrap().insert(tag.to_string());
        Ok(())
    }
}

impl ContainerShell for FakeRuntime {
    async fn exec(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output> {
        self.record(format!("exec {container}: {}", request.command))?;
        let (code, stdout) = self.record_exec(container, request);
        Ok(output(code, &stdout))
    }

    fn exec_stream(&self, container: &str, request: &ExecRequest<'_>) -> Result<ExecStream> {
        self.record(format!("stream {container}: {}", request.command))?;
        let (code, stdout) = self.record_exec(container, request);
        let chunks: Vec<Result<String>> = stdout.lines().map(|l| Ok(format!("{l}\n"))).collect();
        Ok(ExecStream::new(
            stream::iter(chunks).boxed(),
            async move { Ok::<_, anyhow::Error>(code) }.boxed(),
        ))
    }

    async fn exec_detached(&self, container: &str, request: &ExecRequest<'_>) -> Result<Output> {
        self.record(format!("exec_d {container}: {}", request.command))?;
        let (code, _) = self.record_exec(container, request);
        Ok(output(code, ""))
    }
}

impl FileTransfer for FakeRuntime {
    async fn copy_into(
        &self,
        container: &str,
        src: &Path,
        dst: &str,
        options: &CopyOptions<'_>,
    ) -> Result<()> {
        self.record(format!(
            "copy {container} {} -> {dst} owner={}",
            src.display(),
            options.owner.unwrap_or("root:root")
        ))
    }

    async fn write_file(
        &self,
        container: &str,
        dst: &str,
        contents: &[u8],
        options: &CopyOptions<'_>,
    ) -> Result<()> {
        self.record(format!(
            "write {container} {dst} owner={} mode={}",
            options.owner.unwrap_or("root:root"),
            options.mode.unwrap_or("-")
        ))?;
        self.files.lock().unwrap().insert(
            (container.to_string(), dst.to_string()),
            String::from_utf8_lossy(contents).into_owned(),
        );
        Ok(())
    }
}

impl ImageBuilder for FakeRuntime {
    async fn ensure_images(&self, images: &ImagesFile, _base_dir: &Path) -> Result<()> {
        self.record(format!("ensure_images {}", images.len()))
    }
}

impl DatabaseProvisioner for FakeRuntime {
    async fn ensure_databases(
        &self,
        config_paths: &[PathBuf],
        _registry: &ContainerRegistry,
    ) -> Result<()> {
        self.record(format!("ensure_databases {}", config_paths.len()))
    }
}

impl GracePeriod for FakeRuntime {
    async fn wait(&self, period: Duration) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("grace {}s", period.as_secs()));
    }
}

/// In-memory filesystem: a set of directories and a map of files.
#[derive(Default)]
pub struct FakeFs {
    pub dirs: BTreeSet<PathBuf>,
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

impl FakeFs {
    pub fn with_dirs(dirs: &[&str]) -> Self {
        Self {
            dirs: dirs.iter().map(PathBuf::from).collect(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files
            .insert(PathBuf::from(path), contents.as_bytes().to_vec());
        self
    }
}

impl LocalFs for FakeFs {
    fn exists(&self, path: &Path) -> bool {
        self.dirs.contains(path) || self.files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{}: no such file", path.display()))
    }
}

/// Topology files served from memory; every load is logged.
#[derive(Default)]
pub struct FakeTopology {
    pub networks: NetworksFile,
    pub images: ImagesFile,
    pub containers: Vec<ContainerSpec>,
    pub loads: Mutex<Vec<String>>,
}

impl TopologySource for FakeTopology {
    fn networks(&self, path: &Path) -> Result<NetworksFile> {
        self.loads.lock().unwrap().push(format!("networks {}", path.display()));
        Ok(self.networks.clone())
    }

    fn images(&self, path: &Path) -> Result<ImagesFile> {
        self.loads.lock().unwrap().push(format!("images {}", path.display()));
        Ok(self.images.clone())
    }

    fn containers(&self, path: &Path) -> Result<Vec<ContainerSpec>> {
        self.loads.lock().unwrap().push(format!("containers {}", path.display()));
        Ok(self.containers.clone())
    }
}

#[derive(Default)]
pub struct FakeCheckpoints {
    pub saved: Mutex<Option<RunCheckpoint>>,
}

impl CheckpointStore for FakeCheckpoints {
    async fn load(&self) -> Result<Option<RunCheckpoint>> {
        Ok(self.saved.lock().unwrap().clone())
    }

    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        *self.saved.lock().unwrap() = Some(checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.saved.lock().unwrap() = None;
        Ok(())
    }
}

/// Records every message with a level prefix.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("ok: {message}"));
    }

    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("warn: {message}"));
    }

    fn output(&self, chunk: &str) {
        self.messages.lock().unwrap().push(format!("out: {chunk}"));
    }
}
