//! Network topology resolution: pure data, no I/O.
//!
//! Built once per batch before any container exists, so every container can
//! be started with static host entries for its network neighbours.

use std::collections::{BTreeMap, BTreeSet};

use testbed_common::ContainerSpec;

/// Literal interface name that stands for "use the hostname".
const HOSTNAME_ALIAS: &str = "hostname";

/// Hosts and interface addresses on one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkHosts {
    pub hosts: BTreeSet<String>,
    /// Interface name to address. Interfaces without an address map to `None`.
    pub interfaces: BTreeMap<String, Option<String>>,
}

/// Network name to its hosts and interface addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkTopology {
    networks: BTreeMap<String, NetworkHosts>,
}

impl NetworkTopology {
    /// Resolve the topology of a batch of specs.
    ///
    /// Specs without a hostname or without interfaces contribute nothing.
    #[must_use]
    pub fn resolve(specs: &[ContainerSpec]) -> Self {
        let mut networks: BTreeMap<String, NetworkHosts> = BTreeMap::new();
        for spec in specs {
            let Some(hostname) = spec.name() else {
                continue;
            };
            for iface in &spec.network_interfaces {
                let Some(network) = iface.network.as_deref() else {
                    continue;
                };
                let entry = networks.entry(network.to_string()).or_default();
                entry.hosts.insert(hostname.to_string());
                let name = match iface.name.as_deref() {
                    Some(n) if n != HOSTNAME_ALIAS && !n.is_empty() => n,
                    _ => hostname,
                };
                entry
                    .interfaces
                    .insert(name.to_string(), iface.address().map(str::to_string));
            }
        }
        Self { networks }
    }

    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkHosts> {
        self.networks.get(name)
    }

    pub fn networks(&self) -> impl Iterator<Item = (&String, &NetworkHosts)> {
        self.networks.iter()
    }

    /// Static host entries for `hostname`: the union of addressed interfaces on
    /// every network it joins.
    #[must_use]
    pub fn extra_hosts(&self, hostname: &str) -> BTreeMap<String, String> {
        self.networks
            .values()
            .filter(|n| n.hosts.contains(hostname))
            .flat_map(|n| n.interfaces.iter())
            .filter_map(|(name, addr)| Some((name.clone(), addr.clone()?)))
            .collect()
    }
}
