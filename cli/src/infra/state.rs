//! Run checkpoint persistence for `testbed up --resume`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use testbed_common::RunCheckpoint;

use crate::application::ports::CheckpointStore;

/// Checkpoint location relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".testbed/state.json";

/// Checkpoint store backed by a JSON file.
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    /// A store at `./.testbed/state.json`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(DEFAULT_STATE_PATH))
    }

    /// A store with an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for CheckpointFile {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore for CheckpointFile {
    async fn load(&self) -> Result<Option<RunCheckpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading state file {}", self.path.display()))?;
        let checkpoint = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", self.path.display()))?;
        Ok(Some(checkpoint))
    }

    /// Written to a temp file and renamed into place.
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(checkpoint).context("serializing state")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)
            .with_context(|| format!("writing state file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), level = %checkpoint.completed, "checkpoint saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("removing state file {}", self.path.display()))?;
        }
        Ok(())
    }
}
