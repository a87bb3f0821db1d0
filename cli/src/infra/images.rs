//! Image builder: builds declared image tags that are not present locally.

use std::path::Path;

use anyhow::{Context, Result};
use testbed_common::ImagesFile;

use crate::application::ports::{ImageBuilder, ImageStore, LocalFs, ProgressReporter};
use crate::domain::error::ConfigError;

/// `ImageBuilder` over any `ImageStore`, reading Dockerfiles through `LocalFs`.
pub struct DockerImageBuilder<'a, S, F, P> {
    store: &'a S,
    fs: &'a F,
    reporter: &'a P,
}

impl<'a, S, F, P> DockerImageBuilder<'a, S, F, P>
where
    S: ImageStore,
    F: LocalFs,
    P: ProgressReporter,
{
    pub fn new(store: &'a S, fs: &'a F, reporter: &'a P) -> Self {
        Self {
            store,
            fs,
            reporter,
        }
    }
}

impl<S, F, P> ImageBuilder for DockerImageBuilder<'_, S, F, P>
where
    S: ImageStore,
    F: LocalFs,
    P: ProgressReporter,
{
    async fn ensure_images(&self, images: &ImagesFile, base_dir: &Path) -> Result<()> {
        let local = self.store.list_image_tags().await?;
        for (name, tags) in images {
            for (tag, dockerfile) in tags {
                let reference = format!("{name}:{tag}");
                let path = base_dir.join(dockerfile.path());
                if !self.fs.exists(&path) {
                    return Err(ConfigError::MissingFile(path.display().to_string()).into());
                }
                if local.contains(&reference) {
                    tracing::debug!(image = %reference, "image present, skipping build");
                    continue;
                }
                self.reporter.step(&format!("building image {reference}..."));
                let content = self.fs.read(&path)?;
                self.store
                    .build_image(&reference, &content)
                    .await
                    .with_context(|| format!("building image {reference}"))?;
                self.reporter
                    .success(&format!("docker image [{reference}] has been built"));
            }
        }
        Ok(())
    }
}
