//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use testbed_common::StageLevel;
use thiserror::Error;

// ── Configuration errors ──────────────────────────────────────────────────────

/// Missing or invalid input, detected before anything is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} does not exist")]
    MissingFile(String),

    #[error("configuration file {path} is invalid: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("container spec #{index} has no hostname; every container must be named")]
    MissingHostname { index: usize },

    #[error("cannot provision a container spec without a hostname")]
    UnnamedSpec,

    #[error("hostname '{0}' is declared more than once")]
    DuplicateHostname(String),

    #[error("invalid hostname '{0}': must match ^[a-zA-Z0-9][a-zA-Z0-9_.-]*$")]
    InvalidHostname(String),

    #[error("target container {0} does not exist")]
    UnknownHost(String),

    #[error("agents were given but no repository host to deploy them from")]
    NoRepositoryHost,

    #[error("invalid environment assignment '{0}': expected KEY=VALUE")]
    InvalidAssignment(String),
}

// ── Provisioning errors ───────────────────────────────────────────────────────

/// A container could not be brought to its declared state.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("building process of container {host} failed: command '{command}' exited with code {code}")]
    CommandFailed {
        host: String,
        command: String,
        code: i32,
    },

    #[error("container {host}: {stage} failed")]
    Step { host: String, stage: &'static str },
}

// ── Remote execution errors ───────────────────────────────────────────────────

/// A remote command failed under the fail-fast policy.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("error when executing cmd [{command}] on container instance [{host}], exit code: {code}")]
    NonZeroExit {
        host: String,
        command: String,
        code: i32,
    },

    #[error("can not find container instance [{0}]")]
    UnknownHost(String),
}

// ── Trust bootstrap errors ────────────────────────────────────────────────────

/// SSH trust setup failed. Always fatal: a partial mesh is worse than none.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("failed to set up ssh for the container [{host}]: {reason}")]
    KeyGeneration { host: String, reason: String },

    #[error("failed to get ssh public key for the container [{host}]: {reason}")]
    KeyRetrieval { host: String, reason: String },

    #[error("failed to start ssh service on the container [{host}]: {reason}")]
    DaemonStart { host: String, reason: String },

    #[error("failed to scan host key for container {host}: {reason}")]
    KeyScan { host: String, reason: String },

    #[error("ssh host {0} is in the key store but has no running container")]
    MissingContainer(String),
}

// ── Stage errors ──────────────────────────────────────────────────────────────

/// A level failed; the run stops here.
#[derive(Debug, Error)]
#[error("level [{level}] failed")]
pub struct StageError {
    pub level: StageLevel,
    #[source]
    pub source: anyhow::Error,
}

/// Exit code to report for an error chain.
///
/// A failed remote command propagates its own code; anything else is 1.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(ProvisionError::CommandFailed { code, .. }) = cause.downcast_ref() {
            return *code;
        }
        if let Some(ExecError::NonZeroExit { code, .. }) = cause.downcast_ref() {
            return *code;
        }
    }
    1
}
