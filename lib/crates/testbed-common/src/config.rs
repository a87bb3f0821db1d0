//! Schemas for the network, image and database configuration files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Contents of the networks file: network name to settings.
pub type NetworksFile = BTreeMap<String, NetworkConfig>;

/// Contents of the images file: image name to tag to Dockerfile.
pub type ImagesFile = BTreeMap<String, BTreeMap<String, DockerfileRef>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Docker network driver, `bridge` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

impl NetworkConfig {
    #[must_use]
    pub fn driver(&self) -> &str {
        self.driver.as_deref().unwrap_or("bridge")
    }

    /// Subnet and gateway, only when both are set.
    #[must_use]
    pub fn ipam(&self) -> Option<(&str, &str)> {
        Some((self.subnet.as_deref()?, self.gateway.as_deref()?))
    }
}

/// Dockerfile path, bare or wrapped in an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DockerfileRef {
    Path(String),
    Detailed { dockerfile: String },
}

impl DockerfileRef {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Path(p) | Self::Detailed { dockerfile: p } => p,
        }
    }
}

/// One database to create. Unknown keys are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatabaseConfig {
    /// The container that hosts this database.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.settings.as_ref()?.get("host")?.as_str()
    }

    #[must_use]
    pub fn is_postgres(&self) -> bool {
        self.kind.as_deref() == Some("postgres")
    }

    /// Copy of this config addressed from inside the hosting container.
    #[must_use]
    pub fn localized(&self) -> Self {
        let mut copy = self.clone();
        if let Some(settings) = copy.settings.as_mut() {
            settings.insert("host".to_string(), Value::String("localhost".to_string()));
        }
        copy
    }
}

/// A database file holds one config or a list of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DatabaseFile {
    One(DatabaseConfig),
    Many(Vec<DatabaseConfig>),
}

impl DatabaseFile {
    #[must_use]
    pub fn into_configs(self) -> Vec<DatabaseConfig> {
        match self {
            Self::One(c) => vec![c],
            Self::Many(v) => v,
        }
    }
}
