//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! docker CLI, tar packing, filesystem access and config/state files.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod archive;
pub mod command_runner;
pub mod config;
pub mod database;
pub mod docker;
pub mod fs;
pub mod images;
pub mod state;
