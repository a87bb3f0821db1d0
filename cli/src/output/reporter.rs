//! `ProgressReporter` on the terminal.

use std::io::Write as _;

use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

/// Prints service progress as `→`, `✓` and `!` lines.
///
/// Only remote command output survives `--quiet`; it is written verbatim and
/// flushed per chunk so streamed output interleaves correctly.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    fn line(&self, marker: &str, style: owo_colors::Style, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", marker.style(style));
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.line("→", self.ctx.styles.step, message);
    }

    fn success(&self, message: &str) {
        self.line("✓", self.ctx.styles.success, message);
    }

    fn warn(&self, message: &str) {
        tracing::debug!(%message, "warning reported");
        self.line("!", self.ctx.styles.warning, message);
    }

    fn output(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }
}
