//! Throughput samples and the rolling window that smooths them.
//!
//! The "current speed" of a direction is the mean of every sample that
//! settled within five seconds of the newest one, not the most recent
//! probe. The window only moves when a sample arrives, so a reading holds
//! while the next probe is still in flight.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Retention horizon of a [`SampleWindow`] in milliseconds.
pub const DEFAULT_WINDOW_HORIZON_MS: f64 = 5000.0;

/// Upper bound for a plausible throughput reading, exclusive.
pub const MAX_PLAUSIBLE_MBPS: f64 = 10_000.0;

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    /// A real transfer against a remote endpoint.
    Measured,
    /// A synthetic value produced after every endpoint failed.
    Simulated,
}

/// Throughput result of one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Throughput in Mbps
    pub value_mbps: f64,
    /// Settlement time in ms since the run started (monotonic)
    pub timestamp_ms: f64,
    /// Transfer duration in ms
    pub duration_ms: f64,
    pub source: SampleSource,
}

impl Sample {
    pub fn measured(value_mbps: f64, timestamp_ms: f64, duration_ms: f64) -> Self {
        Self {
            value_mbps,
            timestamp_ms,
            duration_ms,
            source: SampleSource::Measured,
        }
    }

    pub fn simulated(value_mbps: f64, timestamp_ms: f64) -> Self {
        Self {
            value_mbps,
            timestamp_ms,
            duration_ms: 0.0,
            source: SampleSource::Simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.source == SampleSource::Simulated
    }
}

/// Smoothed reading of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowReading {
    /// Mean of the retained samples in Mbps
    pub mbps: f64,
    /// True when at least one retained sample is synthetic
    pub simulated: bool,
    /// Number of samples the mean was computed from
    pub samples: usize,
}

/// Fixed-duration rolling buffer of throughput samples for one direction.
///
/// Every retained sample lies within `[latest - horizon, latest]`, where
/// `latest` is the greatest timestamp the window has seen. Samples may be
/// inserted out of timestamp order; a sample already older than the
/// horizon is dropped on insertion.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    horizon_ms: f64,
    latest_ms: Option<f64>,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_HORIZON_MS)
    }
}

impl SampleWindow {
    pub fn new(horizon_ms: f64) -> Self {
        Self { samples: VecDeque::new(), horizon_ms, latest_ms: None }
    }

    /// Append a sample and evict everything outside the horizon.
    pub fn insert(&mut self, sample: Sample) {
        let latest = match self.latest_ms {
            Some(latest) => latest.max(sample.timestamp_ms),
            None => sample.timestamp_ms,
        };
        self.latest_ms = Some(latest);

        self.samples.push_back(sample);
        self.evict_before(latest - self.horizon_ms);
    }

    /// Mean of the retained values, `None` when empty.
    ///
    /// `None` means "no data yet" and must not be read as zero throughput.
    /// Evict samples older than `now_ms - horizon`.
    pub fn prune(&mut self, now_ms: f64) {
        self.evict_before(now_ms - self.horizon_ms);
    }

    /// Whether nothing was inserted during the last `limit_ms`.
    pub fn is_stale(&self, now_ms: f64, limit_ms: f64) -> bool {
        self.latest_ms.is_some_and(|latest| now_ms - latest > limit_ms)
    }

    pub fn current_average(&self) -> Option<f64> {
        self.reading().map(|reading| reading.mbps)
    }

    pub fn reading(&self) -> Option<WindowReading> {
        if self.samples.is_empty() {
            return None;
        }

        let sum: f64 = self.samples.iter().map(|s| s.value_mbps).sum();

        Some(WindowReading {
            mbps: sum / self.samples.len() as f64,
            simulated: self.samples.iter().any(Sample::is_simulated),
            samples: self.samples.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    fn evict_before(&mut self, cutoff_ms: f64) {
        self.samples.retain(|sample| sample.timestamp_ms >= cutoff_ms);
    }
}

/// Throughput in Mbps for `bytes` moved in `elapsed`.
///
/// Returns 0.0 when no time elapsed, which validation then rejects.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();

    if seconds <= 0.0 {
        return 0.0;
    }

    calculate_speed_mbps(bytes as f64 * 8.0 / seconds)
}

/// Convert bits per second to megabits per second.
pub fn calculate_speed_mbps(bps: f64) -> f64 {
    bps / 1_000_000.0
}

/// Whether a throughput value is within the sane `(0, 10000)` Mbps range.
pub fn is_plausible_mbps(mbps: f64) -> bool {
    mbps.is_finite() && mbps > 0.0 && mbps < MAX_PLAUSIBLE_MBPS
}
