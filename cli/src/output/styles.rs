//! Stylesheet for terminal output

use owo_colors::Style;

/// Plain by default; `colorize` switches every entry on at once.
#[derive(Default, Clone)]
pub struct Styles {
    pub success: Style,
    pub warning: Style,
    /// In-progress steps.
    pub step: Style,
    /// `[host]` tags in front of remote output.
    pub host: Style,
    pub dim: Style,
}

impl Styles {
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.step = Style::new().cyan();
        self.host = Style::new().bold().magenta();
        self.dim = Style::new().dimmed();
    }
}
