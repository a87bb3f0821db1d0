//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod ssh;
pub mod stage;
pub mod topology;

pub use config::{TestbedConfig, validate_hostname, validate_specs};
pub use context::{ContainerHandle, ContainerRegistry, KeyStore};
pub use error::{ConfigError, ExecError, ProvisionError, StageError, TrustError, exit_code_for};
pub use topology::NetworkTopology;
