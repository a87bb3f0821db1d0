//! Application context: unified state passed to every command handler.
//!
//! `AppContext` bundles the output context, the docker adapter, the loaded
//! defaults file and the checkpoint store so command signatures stay small.

use std::path::Path;

use anyhow::Result;

use crate::domain::config::TestbedConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{JsonTopology, YamlConfigStore};
use crate::infra::docker::DockerCli;
use crate::infra::fs::HostFs;
use crate::infra::state::CheckpointFile;
use crate::output::{OutputContext, SpinnerGrace, TerminalReporter};

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags<'a> {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Explicit defaults file (`--config`).
    pub config: Option<&'a Path>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Docker CLI adapter for every runtime port.
    pub runtime: DockerCli<TokioCommandRunner>,
    pub fs: HostFs,
    pub topology: JsonTopology,
    /// Progress of the last `testbed up`.
    pub checkpoints: CheckpointFile,
    /// Defaults from `testbed.yaml`, or built-ins.
    pub config: TestbedConfig,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when the `CI` or `TESTBED_YES` environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the defaults file is named but missing, or invalid.
    pub fn new(flags: &AppFlags<'_>) -> Result<Self> {
        let config = YamlConfigStore::new(flags.config).load()?;
        let non_interactive = std::env::var("CI").is_ok() || std::env::var("TESTBED_YES").is_ok();

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            runtime: DockerCli::default_runner(),
            fs: HostFs,
            topology: JsonTopology,
            checkpoints: CheckpointFile::new(),
            config,
            non_interactive,
        })
    }

    /// Progress reporter writing to this context's terminal.
    #[must_use]
    pub fn terminal_reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// Grace period that renders a countdown on this context's terminal.
    #[must_use]
    pub fn grace(&self) -> SpinnerGrace<'_> {
        SpinnerGrace::new(&self.output)
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI or `TESTBED_YES`), returns
    /// `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
