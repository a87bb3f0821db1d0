//! Application service: SSH trust between containers.
//!
//! Single-host setup runs during provisioning of each `ssh: true` container.
//! The mesh phase runs once per batch, after every key has been collected.

use anyhow::{Context, Result};
use testbed_common::ContainerSpec;

use crate::application::ports::{
    ContainerShell, CopyOptions, ExecRequest, FileTransfer, ProgressReporter,
};
use crate::domain::context::{ContainerRegistry, KeyStore};
use crate::domain::error::TrustError;
use crate::domain::ssh::{
    AUTHORIZED_KEYS_PATH, KEYGEN_COMMAND, KNOWN_HOSTS_PATH, READ_PUBLIC_KEY_COMMAND,
    START_DAEMON_COMMAND, authorized_keys_for, keyscan_command, validate_public_key,
};

/// Run `command` in `host` and return its stdout, or the failure reason.
async fn run(shell: &impl ContainerShell, host: &str, command: &str) -> Result<String, String> {
    let out = shell
        .exec(host, &ExecRequest::new(command, "/"))
        .await
        .map_err(|e| format!("{e:#}"))?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    } else {
        let mut reason = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if reason.is_empty() {
            reason = String::from_utf8_lossy(&out.stdout).trim().to_string();
        }
        Err(format!(
            "'{command}' exited with code {}: {reason}",
            out.status.code().unwrap_or(-1)
        ))
    }
}

/// Read back `host`'s public key.
async fn read_public_key(shell: &impl ContainerShell, host: &str) -> Result<String> {
    let key = run(shell, host, READ_PUBLIC_KEY_COMMAND)
        .await
        .map_err(|reason| TrustError::KeyRetrieval {
            host: host.to_string(),
            reason,
        })?;
    validate_public_key(&key).map_err(|e| TrustError::KeyRetrieval {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    Ok(key)
}

/// Generate a key pair in `host`, read back the public key, start `sshd`.
///
/// # Errors
///
/// Returns a `TrustError` naming the step that failed.
pub async fn setup_host(shell: &impl ContainerShell, host: &str) -> Result<String> {
    run(shell, host, KEYGEN_COMMAND)
        .await
        .map_err(|reason| TrustError::KeyGeneration {
            host: host.to_string(),
            reason,
        })?;
    let key = read_public_key(shell, host).await?;
    run(shell, host, START_DAEMON_COMMAND)
        .await
        .map_err(|reason| TrustError::DaemonStart {
            host: host.to_string(),
            reason,
        })?;
    tracing::debug!(host, "ssh daemon started");
    Ok(key)
}

/// Whether a filtered rebuild needs the trust phase at all.
///
/// Without a filter the answer is always yes.
#[must_use]
pub fn should_bootstrap(specs: &[ContainerSpec], filter: Option<&[String]>) -> bool {
    let Some(hosts) = filter else {
        return true;
    };
    specs
        .iter()
        .filter(|s| s.ssh)
        .filter_map(ContainerSpec::name)
        .any(|name| hosts.iter().any(|h| h == name))
}

/// Add keys for `ssh: true` hosts that are running but not yet in `keys`.
///
/// Cached keys are reused as-is.
///
/// # Errors
///
/// Returns `TrustError::KeyRetrieval` if a key cannot be read.
pub async fn collect_missing_keys(
    shell: &impl ContainerShell,
    specs: &[ContainerSpec],
    registry: &ContainerRegistry,
    keys: &mut KeyStore,
) -> Result<()> {
    for host in specs.iter().filter(|s| s.ssh).filter_map(ContainerSpec::name) {
        if keys.contains(host) {
            continue;
        }
        let Some(handle) = registry.running(host) else {
            continue;
        };
        let key = read_public_key(shell, &handle.name).await?;
        keys.insert(host, &key);
    }
    Ok(())
}

/// Establish full-mesh trust among every host in `keys`.
///
/// Each host gets every other host's public key in `authorized_keys` and the
/// combined host keys of the whole set in `known_hosts`. Both files are
/// rewritten, so repeated runs never accumulate duplicate entries.
///
/// # Errors
///
/// Returns a `TrustError` if any host is not running, a key scan fails, or a
/// file cannot be written.
pub async fn bootstrap_mesh(
    runtime: &(impl ContainerShell + FileTransfer),
    registry: &ContainerRegistry,
    keys: &KeyStore,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    reporter.step("setting up ssh trust relationships...");

    let mut known_hosts = String::new();
    for host in keys.hosts() {
        let handle = registry
            .running(host)
            .ok_or_else(|| TrustError::MissingContainer(host.to_string()))?;
        let scanned = run(runtime, &handle.name, &keyscan_command(host))
            .await
            .map_err(|reason| TrustError::KeyScan {
                host: host.to_string(),
                reason,
            })?;
        known_hosts.push_str(&scanned);
        if !scanned.is_empty() && !scanned.ends_with('\n') {
            known_hosts.push('\n');
        }
    }

    let options = CopyOptions {
        owner: Some("root:root"),
        mode: Some("600"),
        ..CopyOptions::default()
    };
    for host in keys.hosts() {
        let handle = registry
            .running(host)
            .ok_or_else(|| TrustError::MissingContainer(host.to_string()))?;
        let authorized = authorized_keys_for(host, keys);
        runtime
            .write_file(&handle.name, AUTHORIZED_KEYS_PATH, authorized.as_bytes(), &options)
            .await
            .with_context(|| format!("writing authorized_keys on {host}"))?;
        runtime
            .write_file(&handle.name, KNOWN_HOSTS_PATH, known_hosts.as_bytes(), &options)
            .await
            .with_context(|| format!("writing known_hosts on {host}"))?;
    }

    reporter.success(&format!("ssh trust established among {} hosts", keys.len()));
    Ok(())
}

/// Batch phase: skip check, key top-up, then mesh distribution.
///
/// # Errors
///
/// Propagates any `TrustError` from key collection or distribution.
pub async fn bootstrap(
    runtime: &(impl ContainerShell + FileTransfer),
    specs: &[ContainerSpec],
    filter: Option<&[String]>,
    registry: &ContainerRegistry,
    keys: &mut KeyStore,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    if !should_bootstrap(specs, filter) {
        tracing::debug!("no filtered host has ssh enabled, skipping trust bootstrap");
        return Ok(());
    }
    collect_missing_keys(runtime, specs, registry, keys).await?;
    bootstrap_mesh(runtime, registry, keys, reporter).await
}
