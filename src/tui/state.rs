//! Dashboard state.
//!
//! Everything the renderer needs, rebuilt from progress events so the
//! display never reaches into the orchestrator.

use super::progress::{ProgressEvent, RunPhase};
use crate::config::{
    TestDirection, MAX_SAMPLING_INTERVAL_MS, MIN_SAMPLING_INTERVAL_MS,
};
use crate::results::RunStatistics;

/// Chart points kept per series; older points scroll off.
pub const MAX_HISTORY_POINTS: usize = 600;

/// Step applied by the interval keys, in ms.
pub const INTERVAL_STEP_MS: u64 = 1000;

/// Error information for display.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub message: String,
    pub suggestion: Option<String>,
}

/// Latest value and chart history of one metric.
#[derive(Debug, Clone, Default)]
pub struct SeriesState {
    /// Value of the latest sample, `None` while there is no reading
    pub current: Option<f64>,
    /// Whether the latest value is synthetic
    pub simulated: bool,
    pub peak: Option<f64>,
    /// `(time_sec, value)` of every sample that had a value
    pub history: Vec<(f64, f64)>,
}

impl SeriesState {
    fn push(&mut self, time_sec: f64, value: Option<f64>, simulated: bool) {
        self.current = value;
        self.simulated = simulated && value.is_some();

        let Some(value) = value else {
            return;
        };

        self.peak = Some(self.peak.map_or(value, |peak| peak.max(value)));
        self.history.push((time_sec, value));

        if self.history.len() > MAX_HISTORY_POINTS {
            let excess = self.history.len() - MAX_HISTORY_POINTS;
            self.history.drain(..excess);
        }
    }
}

/// State for the dashboard.
#[derive(Debug, Clone)]
pub struct TuiState {
    pub phase: RunPhase,
    pub direction: TestDirection,
    /// Zero for a continuous run
    pub duration_secs: u64,
    pub sampling_interval_ms: u64,
    pub elapsed_sec: f64,
    pub ticks: usize,
    pub download: SeriesState,
    pub upload: SeriesState,
    pub ping: SeriesState,
    pub statistics: Option<RunStatistics>,
    pub error: Option<ErrorInfo>,
    /// Terminal width for layout
    pub terminal_width: u16,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            direction: TestDirection::Both,
            duration_secs: 0,
            sampling_interval_ms: 3000,
            elapsed_sec: 0.0,
            ticks: 0,
            download: SeriesState::default(),
            upload: SeriesState::default(),
            ping: SeriesState::default(),
            statistics: None,
            error: None,
            terminal_width: 80,
        }
    }
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&mut self, message: String, suggestion: Option<String>) {
        self.error = Some(ErrorInfo { message, suggestion });
    }

    /// Sampling interval after pressing an interval key `steps` times,
    /// clamped to the accepted range.
    pub fn stepped_interval_ms(&self, steps: i64) -> u64 {
        let target = self.sampling_interval_ms as i64
            + steps * INTERVAL_STEP_MS as i64;

        target.clamp(
            MIN_SAMPLING_INTERVAL_MS as i64,
            MAX_SAMPLING_INTERVAL_MS as i64,
        ) as u64
    }

    /// X axis bounds of the chart, in seconds.
    pub fn time_bounds(&self) -> [f64; 2] {
        let first = [&self.download, &self.upload]
            .iter()
            .filter_map(|series| series.history.first().map(|(t, _)| *t))
            .fold(f64::MAX, f64::min);

        if first == f64::MAX {
            return [0.0, 60.0];
        }

        [first, self.elapsed_sec.max(first + 10.0)]
    }

    /// Y axis upper bound of the chart, in Mbps.
    pub fn speed_ceiling(&self) -> f64 {
        let peak = [self.download.peak, self.upload.peak]
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max);

        (peak * 1.1).max(10.0)
    }

    pub fn update_from_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PhaseChange(phase) => {
                self.phase = *phase;
            }
            ProgressEvent::RunStarted {
                direction,
                duration,
                sampling_interval,
            } => {
                *self = Self {
                    phase: self.phase,
                    terminal_width: self.terminal_width,
                    direction: *direction,
                    duration_secs: duration.as_secs(),
                    sampling_interval_ms: sampling_interval.as_millis() as u64,
                    ..Self::default()
                };
            }
            ProgressEvent::Tick { index, record } => {
                let time = record.relative_time_sec;
                self.ticks = index + 1;
                self.elapsed_sec = time;
                self.download.push(
                    time,
                    record.download_mbps,
                    record.simulated.download,
                );
                self.upload.push(
                    time,
                    record.upload_mbps,
                    record.simulated.upload,
                );
                self.ping.push(time, Some(record.ping_ms), record.simulated.ping);
            }
            ProgressEvent::IntervalChanged(interval) => {
                self.sampling_interval_ms = interval.as_millis() as u64;
            }
            ProgressEvent::Error(message) => {
                self.set_error(message.clone(), None);
            }
            ProgressEvent::Finished(statistics) => {
                self.statistics = Some(statistics.clone());
            }
        }
    }
}
