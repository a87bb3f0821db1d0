//! Application service: container provisioning.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Containers are built one at a time, in spec order: a later spec may depend
//! on an earlier one's bootstrap output.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use testbed_common::{ContainerSpec, VolumeBinding};

use crate::application::ports::{
    ContainerLifecycle, ContainerRuntime, CopyOptions, ErrorPolicy, LocalFs, ProgressReporter, RunSpec,
};
use crate::application::services::exec::{self, RemoteCommand};
use crate::application::services::trust;
use crate::domain::config::validate_specs;
use crate::domain::context::{ContainerHandle, ContainerRegistry, KeyStore};
use crate::domain::error::{ConfigError, ExecError, ProvisionError};
use crate::domain::topology::NetworkTopology;

/// Options for one provisioning batch.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions<'a> {
    /// Rebuild only these hosts; the rest of the batch still shapes topology
    /// and trust.
    pub hosts: Option<&'a [String]>,
    /// Policy for bootstrap commands.
    pub policy: ErrorPolicy,
}

/// Shared lookups taken once at the start of a batch.
pub struct BatchState {
    pub topology: NetworkTopology,
    /// Networks that exist on the runtime.
    pub networks: BTreeSet<String>,
    /// Local `repository:tag` references.
    pub images: BTreeSet<String>,
}

fn step(host: &str, stage: &'static str) -> ProvisionError {
    ProvisionError::Step {
        host: host.to_string(),
        stage,
    }
}

/// Volumes need both a bind path and a mode to be mounted.
fn mountable_volumes(volumes: &BTreeMap<String, VolumeBinding>) -> BTreeMap<String, VolumeBinding> {
    volumes
        .iter()
        .filter(|(_, v)| v.bind.is_some() && v.mode.is_some())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Provision one container from `spec`.
///
/// Any container already registered under the same hostname is force-removed
/// first. Copy entries with a missing source and interfaces on unknown
/// networks are skipped.
///
/// # Errors
///
/// Returns `ProvisionError::Step` for runtime failures, a `TrustError` when
/// SSH setup fails, and `ProvisionError::CommandFailed` when a bootstrap
/// command exits nonzero under `ErrorPolicy::FailFast`.
#[allow(clippy::too_many_arguments)]
pub async fn provision(
    runtime: &impl ContainerRuntime,
    local_fs: &impl LocalFs,
    reporter: &impl ProgressReporter,
    spec: &ContainerSpec,
    batch: &BatchState,
    registry: &mut ContainerRegistry,
    keys: &mut KeyStore,
    policy: ErrorPolicy,
) -> Result<ContainerHandle> {
    let hostname = spec
        .name()
        .ok_or(ConfigError::UnnamedSpec)?;
    let image = spec
        .image
        .as_deref()
        .with_context(|| format!("container {hostname} has no image"))?;

    let extra_hosts = batch.topology.extra_hosts(hostname);

    if let Some(stale) = registry.get(hostname) {
        tracing::debug!(host = hostname, id = %stale.id, "removing existing container");
        runtime
            .remove(&stale.name)
            .await
            .with_context(|| step(hostname, "remove existing container"))?;
        registry.remove(hostname);
    }

    reporter.step(&format!("building container {hostname} from image {image}..."));
    let environment = spec.environment.assignments();
    let volumes = mountable_volumes(&spec.volumes);
    let handle = runtime
        .run(&RunSpec {
            name: hostname,
            image,
            extra_hosts: &extra_hosts,
            ports: &spec.ports,
            environment: &environment,
            volumes: &volumes,
        })
        .await
        .with_context(|| step(hostname, "create"))?;
    registry.insert(handle.clone());

    for copy in &spec.copy {
        if copy.source.is_empty() || copy.target.is_empty() {
            continue;
        }
        let source = Path::new(&copy.source);
        if !local_fs.is_dir(source) {
            tracing::debug!(host = hostname, source = %copy.source, "copy source missing, skipped");
            continue;
        }
        let options = CopyOptions {
            filter: &copy.filter,
            ..CopyOptions::default()
        };
        runtime
            .copy_into(&handle.name, source, &copy.target, &options)
            .await
            .with_context(|| step(hostname, "copy"))?;
    }

    for iface in &spec.network_interfaces {
        let Some(network) = iface.network.as_deref() else {
            continue;
        };
        if !batch.networks.contains(network) {
            tracing::debug!(host = hostname, network, "network not found, skipped");
            continue;
        }
        runtime
            .connect(network, &handle.name, iface.ipv4.as_deref())
            .await
            .with_context(|| step(hostname, "network attach"))?;
        reporter.step(&format!(
            "container [{hostname}] ip address [{}] is on",
            iface.ipv4.as_deref().unwrap_or("auto")
        ));
    }

    if spec.ssh {
        let key = trust::setup_host(runtime, &handle.name).await?;
        keys.insert(hostname, &key);
        reporter.step(&format!("container [{hostname}] ssh has been set up"));
    }

    if let Some(commands) = &spec.commands {
        run_commands(runtime, registry, reporter, hostname, commands, policy).await?;
    }

    reporter.success(&format!("container {hostname} has been built from image {image}"));
    Ok(handle)
}

async fn run_commands(
    runtime: &impl ContainerRuntime,
    registry: &ContainerRegistry,
    reporter: &impl ProgressReporter,
    hostname: &str,
    commands: &testbed_common::CommandSpec,
    policy: ErrorPolicy,
) -> Result<()> {
    let workdir = commands.workdir();
    let environment = commands.environment.assignments();
    for cmd in &commands.cmd {
        let label = format!("[{hostname}:{workdir}/{cmd}]");
        reporter.step(&format!("{label} command execution started ..."));
        let started = Instant::now();
        let call = RemoteCommand {
            host: hostname,
            command: cmd,
            workdir,
            environment: &environment,
        };
        let code = match exec::exec(runtime, registry, reporter, &call, policy).await {
            Ok(output) => output.finish(|chunk| reporter.output(chunk)).await?,
            Err(err) => match err.downcast_ref::<ExecError>() {
                Some(ExecError::NonZeroExit { code, .. }) => {
                    let code = *code;
                    reporter.step(&format!(
                        "{label} command execution finished in {:.1}s with exit code {code}",
                        started.elapsed().as_secs_f64()
                    ));
                    return Err(ProvisionError::CommandFailed {
                        host: hostname.to_string(),
                        command: cmd.clone(),
                        code,
                    }
                    .into());
                }
                _ => return Err(err.context(step(hostname, "command"))),
            },
        };
        reporter.step(&format!(
            "{label} command execution finished in {:.1}s with exit code {code}",
            started.elapsed().as_secs_f64()
        ));
    }
    Ok(())
}

/// Snapshot `spec`'s container into its commit tag, replacing any older image.
async fn commit(
    runtime: &impl ContainerRuntime,
    reporter: &impl ProgressReporter,
    spec: &ContainerSpec,
    registry: &ContainerRegistry,
    images: &mut BTreeSet<String>,
) -> Result<()> {
    let (Some(hostname), Some(commit)) = (spec.name(), spec.commit.as_ref()) else {
        return Ok(());
    };
    let Some(handle) = registry.get(hostname) else {
        return Ok(());
    };
    let reference = commit.reference();
    if images.remove(&reference) {
        runtime
            .remove_image(&reference)
            .await
            .with_context(|| step(hostname, "remove old image"))?;
    }
    runtime
        .commit(&handle.name, &reference)
        .await
        .with_context(|| step(hostname, "commit"))?;
    images.insert(reference.clone());
    reporter.success(&format!("new image [{reference}] has been built"));
    Ok(())
}

fn selected(spec: &ContainerSpec, hosts: Option<&[String]>) -> bool {
    match (spec.name(), hosts) {
        (Some(_), None) => true,
        (Some(name), Some(hosts)) => hosts.iter().any(|h| h == name),
        (None, _) => false,
    }
}

/// Registry of the containers that exist right now, running or not.
///
/// # Errors
///
/// Returns an error if the runtime cannot list containers.
pub async fn discover(lifecycle: &impl ContainerLifecycle) -> Result<ContainerRegistry> {
    let handles = lifecycle
        .list_containers()
        .await
        .context("listing containers")?;
    Ok(ContainerRegistry::from_handles(handles))
}

/// Provision a batch: every selected spec in order, then SSH trust, then commits.
///
/// # Errors
///
/// Returns a `ConfigError` before touching anything if a spec is unnamed,
/// duplicated, or the host filter names an undeclared host. Stops at the
/// first provisioning failure.
pub async fn build_containers(
    runtime: &impl ContainerRuntime,
    local_fs: &impl LocalFs,
    reporter: &impl ProgressReporter,
    specs: &[ContainerSpec],
    opts: BuildOptions<'_>,
    registry: &mut ContainerRegistry,
    keys: &mut KeyStore,
) -> Result<()> {
    validate_specs(specs)?;
    if let Some(hosts) = opts.hosts {
        for host in hosts {
            if !specs.iter().any(|s| s.name() == Some(host.as_str())) {
                return Err(ConfigError::UnknownHost(host.clone()).into());
            }
        }
    }

    let mut batch = BatchState {
        topology: NetworkTopology::resolve(specs),
        networks: runtime
            .list_networks()
            .await
            .context("listing networks")?
            .into_iter()
            .collect(),
        images: runtime
            .list_image_tags()
            .await
            .context("listing images")?
            .into_iter()
            .collect(),
    };

    for spec in specs.iter().filter(|s| selected(s, opts.hosts)) {
        if spec.image.is_none() {
            tracing::debug!(host = spec.name(), "no image declared, skipped");
            continue;
        }
        provision(
            runtime, local_fs, reporter, spec, &batch, registry, keys, opts.policy,
        )
        .await?;
    }

    trust::bootstrap(runtime, specs, opts.hosts, registry, keys, reporter).await?;

    for spec in specs.iter().filter(|s| selected(s, opts.hosts)) {
        commit(runtime, reporter, spec, registry, &mut batch.images).await?;
    }
    Ok(())
}
