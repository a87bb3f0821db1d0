//! Per-run context objects: the container registry and the SSH key store.
//!
//! Both are owned by the caller and passed into each service call, so
//! separate runs (and tests) never share state.

use std::collections::BTreeMap;

/// A container as reported by the runtime, running or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub name: String,
    pub id: String,
    pub running: bool,
}

/// Hostname to live container handle.
///
/// Once a hostname is rebuilt the registry holds the new handle, never the
/// stale one.
#[derive(Debug, Clone, Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<String, ContainerHandle>,
}

impl ContainerRegistry {
    /// Seed from a runtime listing.
    #[must_use]
    pub fn from_handles(handles: impl IntoIterator<Item = ContainerHandle>) -> Self {
        Self {
            containers: handles.into_iter().map(|h| (h.name.clone(), h)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, hostname: &str) -> Option<&ContainerHandle> {
        self.containers.get(hostname)
    }

    #[must_use]
    pub fn contains(&self, hostname: &str) -> bool {
        self.containers.contains_key(hostname)
    }

    /// The handle for `hostname` only if its container is running; stopped
    /// containers still count for `get` and `contains`.
    #[must_use]
    pub fn running(&self, hostname: &str) -> Option<&ContainerHandle> {
        self.get(hostname).filter(|h| h.running)
    }

    #[must_use]
    pub fn is_running(&self, hostname: &str) -> bool {
        self.running(hostname).is_some()
    }

    /// Record `handle`, replacing any previous entry for the same name.
    pub fn insert(&mut self, handle: ContainerHandle) {
        self.containers.insert(handle.name.clone(), handle);
    }

    pub fn remove(&mut self, hostname: &str) -> Option<ContainerHandle> {
        self.containers.remove(hostname)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Hostname to SSH public key, for hosts whose spec enables SSH.
///
/// Additive: keys collected by earlier calls are kept and reused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStore {
    keys: BTreeMap<String, String>,
}

impl KeyStore {
    pub fn insert(&mut self, hostname: &str, public_key: &str) {
        self.keys.insert(hostname.to_string(), public_key.to_string());
    }

    #[must_use]
    pub fn get(&self, hostname: &str) -> Option<&str> {
        self.keys.get(hostname).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, hostname: &str) -> bool {
        self.keys.contains_key(hostname)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(h, k)| (h.as_str(), k.as_str()))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
