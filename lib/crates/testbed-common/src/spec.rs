//! Container topology schema, as written in the containers JSON file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One container to provision.
///
/// Field names follow the camelCase keys of the containers file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container name and hostname. Unique within a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Image reference. Specs without an image are not provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Container port (`"22/tcp"`) to host binding.
    #[serde(default)]
    pub ports: BTreeMap<String, PortBinding>,
    /// Host path to bind spec.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeBinding>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub copy: Vec<CopySpec>,
    /// Generate a key pair, start sshd and join the trust mesh.
    #[serde(default)]
    pub ssh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitSpec>,
}

impl ContainerSpec {
    /// Hostname, if declared and non-empty.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }
}

/// A network attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Network name. Interfaces without one are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Name other hosts use to reach this interface. Defaults to the hostname;
    /// the literal `"hostname"` means the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
}

impl NetworkInterface {
    /// The address published for this interface: IPv4 first, then IPv6.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.ipv4.as_deref().or(self.ipv6.as_deref())
    }
}

/// Host side of a published port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortBinding {
    /// `3333` publishes on all host interfaces.
    Port(u16),
    /// `"127.0.0.1:3333"` publishes on one interface.
    Address(String),
}

impl PortBinding {
    /// Render as the host part of a `-p host:container` flag.
    #[must_use]
    pub fn host_part(&self) -> String {
        match self {
            Self::Port(p) => p.to_string(),
            Self::Address(a) => a.clone(),
        }
    }
}

/// Bind-mount target for a host path. Entries missing either field are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Environment given either as a map or as `KEY=VALUE` strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Environment {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Environment {
    /// Flatten into ordered `KEY=VALUE` assignments.
    #[must_use]
    pub fn assignments(&self) -> Vec<String> {
        match self {
            Self::Map(m) => m.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            Self::List(l) => l.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(m) => m.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

/// A local path to copy into the container after it starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopySpec {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    /// Path substrings excluded from the archive.
    #[serde(default)]
    pub filter: Vec<String>,
}

/// Bootstrap commands run in order after the container is up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

impl CommandSpec {
    /// Working directory, `/` when unset.
    #[must_use]
    pub fn workdir(&self) -> &str {
        self.workdir.as_deref().unwrap_or("/")
    }
}

/// Snapshot the provisioned container as `image:tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitSpec {
    pub image: String,
    pub tag: String,
}

impl CommitSpec {
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}
