//! Application service: declared network creation.

use anyhow::{Context, Result};
use testbed_common::NetworksFile;

use crate::application::ports::{NetworkManager, ProgressReporter};

/// Create every declared network that does not exist yet.
///
/// Returns the names that were created, in declaration order.
///
/// # Errors
///
/// Returns an error if listing or creating a network fails.
pub async fn create_networks(
    manager: &impl NetworkManager,
    reporter: &impl ProgressReporter,
    networks: &NetworksFile,
) -> Result<Vec<String>> {
    let existing = manager.list_networks().await.context("listing networks")?;
    let mut created = Vec::new();
    for (name, config) in networks {
        if existing.iter().any(|n| n == name) {
            tracing::debug!(network = %name, "network exists, skipped");
            continue;
        }
        manager
            .create_network(name, config)
            .await
            .with_context(|| format!("creating network {name}"))?;
        reporter.success(&format!("network [{name}] is created"));
        created.push(name.clone());
    }
    Ok(created)
}
