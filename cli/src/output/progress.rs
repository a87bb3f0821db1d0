//! Countdown spinner for the agent grace period

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::application::ports::GracePeriod;
use crate::output::OutputContext;

#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["◐", "◓", "◑", "◒", "●"])
            .template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Replace the spinner with a final `✓ msg` line.
pub fn finish_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(
        ProgressStyle::with_template("  {prefix:.green} {msg}").expect("valid template"),
    );
    pb.set_prefix("✓");
    pb.finish_with_message(msg.to_string());
}

fn countdown(remaining: u64) -> String {
    format!("waiting {remaining}s for agents to settle...")
}

/// Grace period that shows a countdown spinner on a TTY and sleeps otherwise.
pub struct SpinnerGrace<'a> {
    ctx: &'a OutputContext,
}

impl<'a> SpinnerGrace<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl GracePeriod for SpinnerGrace<'_> {
    async fn wait(&self, period: Duration) {
        if !self.ctx.show_progress() {
            tracing::debug!(secs = period.as_secs(), "grace period without spinner");
            tokio::time::sleep(period).await;
            return;
        }
        let total = period.as_secs();
        let pb = spinner(&countdown(total));
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let deadline = tokio::time::Instant::now() + period;
        ticker.tick().await;
        for elapsed in 1..=total {
            tokio::select! {
                _ = ticker.tick() => pb.set_message(countdown(total - elapsed)),
                () = tokio::time::sleep_until(deadline) => break,
            }
        }
        tokio::time::sleep_until(deadline).await;
        finish_ok(&pb, &format!("waited {total}s for agents to settle"));
    }
}
