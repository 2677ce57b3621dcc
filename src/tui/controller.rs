//! Display lifecycle and keyboard control.
//!
//! The controller owns the terminal while a dashboard is shown, turns key
//! presses into run commands and prints the final summary.

use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use colored::Colorize;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};

use super::display_mode::DisplayMode;
use super::progress::{ProgressCallback, ProgressEvent};
use super::renderer::{format_latency, format_speed, render_frame};
use super::state::TuiState;
use crate::errors::SpeedTestError;
use crate::results::RunResults;
use crate::speedtest::engine::{Command, MeasurementRecord};
use crate::speedtest::Direction;
use crate::stats::MetricSummary;

/// Controller for the display.
pub struct TuiController {
    mode: DisplayMode,
    state: Arc<Mutex<TuiState>>,
    /// Only present while the dashboard is shown
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

impl TuiController {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(TuiState::new())),
            terminal: None,
        }
    }

    /// Enter the alternate screen and raw mode. A no-op outside the
    /// dashboard mode.
    pub fn init(&mut self) -> Result<(), SpeedTestError> {
        if self.mode != DisplayMode::Tui || self.terminal.is_some() {
            return Ok(());
        }

        enable_raw_mode().map_err(terminal_error)?;

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)
            .map_err(terminal_error)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))
            .map_err(terminal_error)?;
        let size = terminal.size().map_err(terminal_error)?;
        if let Ok(mut state) = self.state.lock() {
            state.terminal_width = size.width;
        }

        self.terminal = Some(terminal);
        Ok(())
    }

    /// Restore the terminal. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<(), SpeedTestError> {
        let Some(mut terminal) = self.terminal.take() else {
            return Ok(());
        };

        execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
            .map_err(terminal_error)?;
        disable_raw_mode().map_err(terminal_error)?;

        Ok(())
    }

    /// Draw the current state. A no-op outside the dashboard mode.
    pub fn render(&mut self) -> Result<(), SpeedTestError> {
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };

        let width = terminal.size().map_err(terminal_error)?.width;

        // Draw from a snapshot so the lock is not held during I/O.
        let snapshot = {
            let mut state = self.state.lock().map_err(|_| {
                SpeedTestError::critical("display state lock poisoned")
            })?;
            state.terminal_width = width;
            state.clone()
        };

        terminal
            .draw(|frame| render_frame(frame, &snapshot))
            .map_err(terminal_error)?;
        Ok(())
    }

    /// Map a key press to a run command.
    ///
    /// `q`, `Esc` and `Ctrl-C` stop the run; `+` and `-` step the sampling
    /// interval. Keys that would not change anything map to `None`.
    pub fn handle_key(&self, key: KeyEvent) -> Option<Command> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        let steps = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(Command::Stop),
            KeyCode::Char('c')
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Some(Command::Stop)
            }
            KeyCode::Char('+') | KeyCode::Char('=') => 1,
            KeyCode::Char('-') => -1,
            _ => return None,
        };

        let state = self.state.lock().ok()?;
        let target = state.stepped_interval_ms(steps);
        (target != state.sampling_interval_ms)
            .then_some(Command::SetInterval(target))
    }

    /// Drain pending terminal events without blocking and return the
    /// first command they produce.
    pub fn poll_command(&self) -> Result<Option<Command>, SpeedTestError> {
        if self.terminal.is_none() {
            return Ok(None);
        }

        while event::poll(Duration::ZERO).map_err(terminal_error)? {
            if let Event::Key(key) = event::read().map_err(terminal_error)? {
                if let Some(command) = self.handle_key(key) {
                    return Ok(Some(command));
                }
            }
        }

        Ok(None)
    }

    /// Print the final results: JSON in JSON mode, a colored summary
    /// otherwise. The dashboard must be cleaned up first.
    pub fn show_results(
        &self,
        results: &RunResults,
    ) -> Result<(), SpeedTestError> {
        if self.mode == DisplayMode::Json {
            let json = results.to_json().map_err(|e| {
                SpeedTestError::critical(format!(
                    "could not serialize results: {}",
                    e
                ))
            })?;
            println!("{}", json);
            return Ok(());
        }

        println!("{}", summary_text(results));
        Ok(())
    }

    /// Callback for the orchestrator that keeps the display in sync.
    pub fn progress_callback(&self) -> Arc<dyn ProgressCallback> {
        Arc::new(TuiProgressCallback {
            state: Arc::clone(&self.state),
            mode: self.mode,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> Arc<Mutex<TuiState>> {
        Arc::clone(&self.state)
    }
}

fn terminal_error(error: io::Error) -> SpeedTestError {
    SpeedTestError::critical(format!("terminal error: {}", error))
        .with_source(error)
}

impl Drop for TuiController {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn summary_line(
    label: &str,
    summary: Option<&MetricSummary>,
    format: fn(f64) -> String,
) -> String {
    let value = match summary {
        Some(s) => format!(
            "{} {}",
            format(s.average).bright_cyan(),
            format!("(max {}, min {})", format(s.maximum), format(s.minimum))
                .dimmed()
        ),
        None => "N/A".dimmed().to_string(),
    };

    format!("{} {}", label.bold().white(), value)
}

/// Human readable summary of a finished run.
pub fn summary_text(results: &RunResults) -> String {
    let statistics = &results.statistics;
    let duration = results
        .duration_secs
        .map(|secs| format!("{} seconds", secs))
        .unwrap_or_else(|| "Continuous".to_string());

    let mut lines = vec![
        format!(
            "{} {}",
            "Test Type:".bold().white(),
            results.test_type.label().bright_blue()
        ),
        format!("{} {}", "Duration:".bold().white(), duration.bright_blue()),
        format!(
            "{} {} ms",
            "Sampling Interval:".bold().white(),
            results.sampling_interval_ms
        ),
        format!("{} {}", "Samples:".bold().white(), statistics.ticks),
    ];

    if results.test_type.includes(Direction::Download) {
        lines.push(summary_line(
            "Download:",
            statistics.download.as_ref(),
            format_speed,
        ));
    }
    if results.test_type.includes(Direction::Upload) {
        lines.push(summary_line(
            "Upload:",
            statistics.upload.as_ref(),
            format_speed,
        ));
    }
    lines.push(summary_line(
        "Ping:",
        statistics.ping.as_ref(),
        format_latency,
    ));

    if statistics.simulated_ticks > 0 {
        lines.push(
            format!(
                "{} of {} samples contain simulated values",
                statistics.simulated_ticks, statistics.ticks
            )
            .yellow()
            .to_string(),
        );
    }

    if let Some(path) = &results.export_path {
        lines.push(format!("{} {}", "Exported:".bold().white(), path));
    }

    lines.join("\n")
}

/// One output line per sample for plain mode.
pub fn plain_line(record: &MeasurementRecord) -> String {
    let reading = |value: Option<f64>| {
        value.map(format_speed).unwrap_or_else(|| "--".to_string())
    };

    let mut line = format!(
        "[{:>7.1}s] {} {}  {} {}  {} {}",
        record.relative_time_sec,
        "Download:".bold().white(),
        reading(record.download_mbps),
        "Upload:".bold().white(),
        reading(record.upload_mbps),
        "Ping:".bold().white(),
        format_latency(record.ping_ms)
    );

    if record.simulated.any() {
        line.push_str(
            &format!("  (simulated: {})", record.simulated.labels().join(", "))
                .yellow()
                .to_string(),
        );
    }

    line
}

/// Progress callback that updates the shared display state.
struct TuiProgressCallback {
    state: Arc<Mutex<TuiState>>,
    mode: DisplayMode,
}

impl ProgressCallback for TuiProgressCallback {
    fn on_progress(&self, event: ProgressEvent) {
        if self.mode == DisplayMode::Plain {
            match &event {
                ProgressEvent::Tick { record, .. } => {
                    println!("{}", plain_line(record))
                }
                ProgressEvent::Error(message) => {
                    eprintln!("{} {}", "Error:".red().bold(), message)
                }
                _ => {}
            }
        }

        // Non-blocking: skip the update rather than stall the sampler.
        if let Ok(mut state) = self.state.try_lock() {
            state.update_from_event(&event);
        }
    }
}
