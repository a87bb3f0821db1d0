//! Defaults file schema (`testbed.yaml`) and hostname validation.
//!
//! Pure functions only: no I/O and no filesystem access.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use testbed_common::ContainerSpec;

use crate::domain::error::ConfigError;

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Working directory of the repository service inside its container.
pub const DEFAULT_WORKDIR: &str = "/sardines/shoal";
/// Seconds to let agents settle before deploying services.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 60;
/// Service deploy command; `{host}` is replaced by the agent hostname.
pub const DEFAULT_SERVICE_DEPLOY_COMMAND: &str = "deploy_service.py --repo-deploy-plan deploy-repository.json --hosts root@{host} --application dietitian --tags test {host}";

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // pattern is a compile-time constant
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid hostname pattern")
});

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level defaults stored in `testbed.yaml`. Every field has a CLI override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestbedConfig {
    pub networks: String,
    pub images: String,
    pub containers: String,
    pub databases: Vec<String>,
    pub repository: RepositoryConfig,
    pub agents: Vec<String>,
    pub workdir: String,
    pub grace_period_secs: u64,
    pub service_deploy: ServiceDeployConfig,
    pub database: DatabaseScriptConfig,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            networks: "./conf/env/networks.json".to_string(),
            images: "./conf/env/images.json".to_string(),
            containers: "./conf/env/containers.json".to_string(),
            databases: vec![
                "./conf/env/db-postgres-test.json".to_string(),
                "./conf/env/db-postgres-dev.json".to_string(),
            ],
            repository: RepositoryConfig::default(),
            agents: vec![
                "nw-test-client-1".to_string(),
                "nw-test-client-2".to_string(),
                "nw-test-client-3".to_string(),
                "nw-test-nginx-1".to_string(),
            ],
            workdir: DEFAULT_WORKDIR.to_string(),
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            service_deploy: ServiceDeployConfig::default(),
            database: DatabaseScriptConfig::default(),
        }
    }
}

/// Repository deploy plans and the hosts they go to, paired by position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub deploy_plans: Vec<String>,
    pub hosts: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            deploy_plans: vec!["./conf/env/deploy-repository-1.json".to_string()],
            hosts: vec!["nw-test-repo-1".to_string()],
        }
    }
}

/// Command run on the repository host once per agent in the Services level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceDeployConfig {
    pub command: String,
    pub environment: Vec<String>,
}

impl Default for ServiceDeployConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_SERVICE_DEPLOY_COMMAND.to_string(),
            environment: vec![
                "PATH=./node_modules/.bin".to_string(),
                "PATH=./bin".to_string(),
            ],
        }
    }
}

impl ServiceDeployConfig {
    /// The command for one agent host.
    #[must_use]
    pub fn command_for(&self, host: &str) -> String {
        self.command.replace("{host}", host)
    }
}

/// Location of the database creation script on the orchestrator host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseScriptConfig {
    pub script: String,
}

impl Default for DatabaseScriptConfig {
    fn default() -> Self {
        Self {
            script: "./env/lib/create_postgres_database.py".to_string(),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a container hostname for use as a Docker container name.
///
/// # Errors
///
/// Returns `ConfigError::InvalidHostname` if the name has illegal characters.
pub fn validate_hostname(name: &str) -> Result<(), ConfigError> {
    if HOSTNAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidHostname(name.to_string()))
    }
}

/// Validates a batch: every spec is named, names are legal and unique.
///
/// # Errors
///
/// Returns the first `ConfigError` found, in spec order.
pub fn validate_specs(specs: &[ContainerSpec]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, spec) in specs.iter().enumerate() {
        let name = spec.name().ok_or(ConfigError::MissingHostname { index })?;
        validate_hostname(name)?;
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateHostname(name.to_string()));
        }
    }
    Ok(())
}
