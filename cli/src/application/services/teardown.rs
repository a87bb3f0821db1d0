//! Application service: environment teardown.

use anyhow::{Context, Result};
use testbed_common::{ContainerSpec, NetworksFile};

use crate::application::ports::{ContainerLifecycle, NetworkManager, ProgressReporter};

/// What `tear_down` removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub containers: Vec<String>,
    pub networks: Vec<String>,
}

/// Force-remove every declared container that exists, then the declared
/// networks when given. Undeclared containers are never touched.
///
/// # Errors
///
/// Returns an error if listing or removing fails.
pub async fn tear_down(
    runtime: &(impl ContainerLifecycle + NetworkManager),
    reporter: &impl ProgressReporter,
    specs: &[ContainerSpec],
    networks: Option<&NetworksFile>,
) -> Result<TeardownOutcome> {
    let mut outcome = TeardownOutcome::default();
    let live = runtime
        .list_containers()
        .await
        .context("listing containers")?;
    for name in specs.iter().filter_map(ContainerSpec::name) {
        let Some(handle) = live.iter().find(|h| h.name == name) else {
            continue;
        };
        runtime
            .remove(&handle.name)
            .await
            .with_context(|| format!("removing container {name}"))?;
        reporter.success(&format!("container {name} removed"));
        outcome.containers.push(name.to_string());
    }

    if let Some(networks) = networks {
        let existing = runtime.list_networks().await.context("listing networks")?;
        for name in networks.keys() {
            if !existing.contains(name) {
                continue;
            }
            runtime
                .remove_network(name)
                .await
                .with_context(|| format!("removing network {name}"))?;
            reporter.success(&format!("network {name} removed"));
            outcome.networks.push(name.clone());
        }
    }
    Ok(outcome)
}
