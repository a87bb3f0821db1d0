//! Postgres database provisioner.
//!
//! Each database config names a hosting container in `settings.host`. The
//! creation script and a copy of the config addressed to `localhost` are
//! pushed into that container and the script runs there as `postgres`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use testbed_common::{DatabaseConfig, DatabaseFile};

use crate::application::ports::{
    ContainerRuntime, CopyOptions, DatabaseProvisioner, ExecRequest, LocalFs, ProgressReporter,
};
use crate::domain::context::ContainerRegistry;
use crate::domain::error::{ConfigError, ExecError};

/// Work directory inside the database container.
pub const DB_WORKDIR: &str = "/sardines";
const SCRIPT_TARGET: &str = "/sardines/create_postgres_database.py";
const CONFIG_TARGET: &str = "/sardines/db_config.json";
const DB_USER: &str = "postgres";
const DB_OWNER: &str = "postgres:postgres";

/// Databases declared in `path`; `None` when the file does not exist.
///
/// # Errors
///
/// Returns `ConfigError::InvalidFile` if the file is neither a database
/// object nor a list of them.
pub fn load_databases(fs: &impl LocalFs, path: &Path) -> Result<Option<Vec<DatabaseConfig>>> {
    if !fs.exists(path) {
        return Ok(None);
    }
    let bytes = fs.read(path)?;
    let file: DatabaseFile =
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(file.into_configs()))
}

/// Creates postgres databases through a script pushed into the host container.
pub struct PostgresProvisioner<'a, R, F, P> {
    runtime: &'a R,
    fs: &'a F,
    reporter: &'a P,
    script: PathBuf,
}

impl<'a, R, F, P> PostgresProvisioner<'a, R, F, P>
where
    R: ContainerRuntime,
    F: LocalFs,
    P: ProgressReporter,
{
    pub fn new(runtime: &'a R, fs: &'a F, reporter: &'a P, script: PathBuf) -> Self {
        Self {
            runtime,
            fs,
            reporter,
            script,
        }
    }

    async fn create(&self, host: &str, config: &DatabaseConfig, script: &[u8]) -> Result<()> {
        let mkdir = format!("mkdir -p {DB_WORKDIR}");
        let out = self
            .runtime
            .exec(host, &ExecRequest::new(&mkdir, "/"))
            .await?;
        if !out.status.success() {
            self.reporter.output(&String::from_utf8_lossy(&out.stdout));
            anyhow::bail!("failed to create work directory at {DB_WORKDIR} on container {host}");
        }

        let owner = CopyOptions {
            owner: Some(DB_OWNER),
            ..CopyOptions::default()
        };
        let executable = CopyOptions {
            mode: Some("770"),
            ..owner
        };
        self.runtime
            .write_file(host, SCRIPT_TARGET, script, &executable)
            .await
            .with_context(|| format!("copying database script to {host}"))?;
        let localized =
            serde_json::to_vec(&config.localized()).context("serializing database config")?;
        self.runtime
            .write_file(host, CONFIG_TARGET, &localized, &owner)
            .await
            .with_context(|| format!("copying database config to {host}"))?;

        let command = format!("{SCRIPT_TARGET} --database-settings-file {CONFIG_TARGET}");
        let request = ExecRequest {
            user: Some(DB_USER),
            ..ExecRequest::new(&command, DB_WORKDIR)
        };
        let out = self.runtime.exec(host, &request).await?;
        self.reporter.output(&String::from_utf8_lossy(&out.stdout));
        self.reporter.output(&String::from_utf8_lossy(&out.stderr));
        let code = out.status.code().unwrap_or(-1);
        if code != 0 {
            return Err(ExecError::NonZeroExit {
                host: host.to_string(),
                command,
                code,
            }
            .into());
        }
        self.reporter
            .success(&format!("database has been created on container {host}"));
        Ok(())
    }
}

impl<R, F, P> DatabaseProvisioner for PostgresProvisioner<'_, R, F, P>
where
    R: ContainerRuntime,
    F: LocalFs,
    P: ProgressReporter,
{
    async fn ensure_databases(
        &self,
        config_paths: &[PathBuf],
        registry: &ContainerRegistry,
    ) -> Result<()> {
        let mut script: Option<Vec<u8>> = None;
        for path in config_paths {
            let Some(configs) = load_databases(self.fs, path)? else {
                tracing::debug!(path = %path.display(), "no database file, skipping");
                continue;
            };
            for config in configs.iter().filter(|c| c.is_postgres()) {
                let Some(host) = config.host().filter(|h| registry.is_running(h)) else {
                    tracing::debug!(host = ?config.host(), "database host not running, skipping");
                    continue;
                };
                if script.is_none() {
                    if !self.fs.exists(&self.script) {
                        return Err(
                            ConfigError::MissingFile(self.script.display().to_string()).into()
                        );
                    }
                    script = Some(self.fs.read(&self.script)?);
                }
                let bytes = script.as_deref().unwrap_or_default();
                self.reporter
                    .step(&format!("creating database on container {host}..."));
                self.create(host, config, bytes)
                    .await
                    .with_context(|| format!("creating database on container {host}"))?;
            }
        }
        Ok(())
    }
}
