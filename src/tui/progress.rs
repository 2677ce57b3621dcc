//! Progress event types and callback interface.
//!
//! The orchestrator emits these events so the display layer can follow a
//! run without reading its internals.

use crate::config::TestDirection;
use crate::results::RunStatistics;
use crate::speedtest::engine::MeasurementRecord;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Stopped,
}

/// Progress events emitted while a run is active.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The run moved to another phase
    PhaseChange(RunPhase),
    /// A run was started
    RunStarted {
        direction: TestDirection,
        /// Zero for a continuous run
        duration: Duration,
        sampling_interval: Duration,
    },
    /// A measurement record was appended
    Tick {
        /// Zero-based position of the record in the run
        index: usize,
        record: MeasurementRecord,
    },
    /// The sampling interval was changed mid-run
    IntervalChanged(Duration),
    /// Something went wrong that the user should see
    Error(String),
    /// The run stopped and its statistics are final
    Finished(RunStatistics),
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking to avoid delaying the sampling
/// tick.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Callback that ignores every event.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct SilentProgress;

#[cfg(test)]
impl ProgressCallback for SilentProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Callback that keeps every event, for inspecting a run afterwards.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
