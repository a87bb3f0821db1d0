//! Config file loaders: the JSON topology files and the YAML defaults file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use testbed_common::{ContainerSpec, ImagesFile, NetworksFile};

use crate::application::ports::TopologySource;
use crate::domain::config::TestbedConfig;
use crate::domain::error::ConfigError;

/// Environment variable naming the defaults file.
pub const CONFIG_ENV: &str = "TESTBED_CONFIG";
/// Defaults file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "testbed.yaml";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.display().to_string()).into());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Production `TopologySource` reading JSON files from disk.
pub struct JsonTopology;

impl TopologySource for JsonTopology {
    fn networks(&self, path: &Path) -> Result<NetworksFile> {
        read_json(path)
    }

    fn images(&self, path: &Path) -> Result<ImagesFile> {
        read_json(path)
    }

    fn containers(&self, path: &Path) -> Result<Vec<ContainerSpec>> {
        read_json(path)
    }
}

/// Resolve the defaults file: `explicit`, then `$TESTBED_CONFIG`, then
/// `./testbed.yaml`.
#[must_use]
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(val) if !val.is_empty() => PathBuf::from(val),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Loads `testbed.yaml`.
pub struct YamlConfigStore {
    path: PathBuf,
    required: bool,
}

impl YamlConfigStore {
    /// A store for the file named on the command line, if any.
    ///
    /// An explicitly named file must exist; the fallbacks may be absent.
    #[must_use]
    pub fn new(explicit: Option<&Path>) -> Self {
        Self {
            path: config_path(explicit),
            required: explicit.is_some(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the defaults, falling back to built-ins when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if an explicit file is missing or any file is
    /// not valid YAML for the schema.
    pub fn load(&self) -> Result<TestbedConfig> {
        if !self.path.exists() {
            if self.required {
                return Err(ConfigError::MissingFile(self.path.display().to_string()).into());
            }
            tracing::debug!(path = %self.path.display(), "no defaults file, using built-ins");
            return Ok(TestbedConfig::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(TestbedConfig::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::InvalidFile {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
