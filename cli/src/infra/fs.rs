//! Filesystem infrastructure: implements `LocalFs` over the host filesystem.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::LocalFs;

/// Production filesystem implementation of `LocalFs`.
pub struct HostFs;

impl LocalFs for HostFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("reading file {}", path.display()))
    }
}
