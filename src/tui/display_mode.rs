//! Display mode detection.
//!
//! Chooses between the live dashboard, line-per-sample output and JSON
//! based on CLI flags and whether stdout is a terminal.

/// The display mode for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Live dashboard with a throughput chart
    Tui,
    /// One line per sample, suitable for pipes and logs
    Plain,
    /// Structured output only, printed when the run ends
    Json,
}

impl DisplayMode {
    /// `--json` always wins; otherwise a terminal gets the dashboard and
    /// anything else gets plain lines.
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty {
            DisplayMode::Tui
        } else {
            DisplayMode::Plain
        }
    }
}
