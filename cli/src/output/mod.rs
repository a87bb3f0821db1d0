//! Terminal output for testbed commands.
//!
//! Everything a command prints goes through `OutputContext` or one of the
//! port implementations built on it: `TerminalReporter` for service progress
//! and `SpinnerGrace` for the agent grace period.

pub mod progress;
pub mod reporter;
pub mod styles;

use std::time::Duration;

use console::Term;
use owo_colors::OwoColorize as _;
pub use progress::SpinnerGrace;
pub use reporter::TerminalReporter;
pub use styles::Styles;

/// Styling and terminal state shared by every printer.
pub struct OutputContext {
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Suppress progress and summaries. Remote command output still prints.
    pub quiet: bool,
}

impl OutputContext {
    /// Colors are used only on a TTY, without `--no-color` or `NO_COLOR`.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let mut styles = Styles::default();
        if !no_color && is_tty && std::env::var_os("NO_COLOR").is_none() {
            styles.colorize();
        }
        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Spinners and countdowns only make sense on an interactive terminal.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "!".style(self.styles.warning));
        }
    }

    /// Banner printed before a remote command's output: `[host] command`.
    pub fn host_banner(&self, host: &str, command: &str) {
        if !self.quiet {
            println!(
                "{} {}",
                host_tag(host).style(self.styles.host),
                command.style(self.styles.dim)
            );
        }
    }

    /// Wall time of the whole command.
    pub fn elapsed(&self, took: Duration) {
        if !self.quiet {
            println!("  {}", format_elapsed(took).style(self.styles.dim));
        }
    }
}

fn host_tag(host: &str) -> String {
    format!("[{host}]")
}

fn format_elapsed(took: Duration) -> String {
    let secs = took.as_secs_f64();
    if secs < 60.0 {
        format!("total time used: {secs:.1}s")
    } else {
        let whole = took.as_secs();
        format!("total time used: {}m {:02}s", whole / 60, whole % 60)
    }
}
