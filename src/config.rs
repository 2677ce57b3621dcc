//! Run configuration.
//!
//! All tunables of the measurement engine live here with their defaults.
//! The CLI only overrides the handful of values a user is expected to
//! change; everything else keeps the documented default.

use crate::errors::SpeedTestError;
use crate::speedtest::endpoints::{
    default_download_endpoints, default_ping_endpoints,
    default_upload_endpoints, Endpoint,
};
use crate::speedtest::Direction;
use clap::ValueEnum;
use serde::Serialize;
use std::time::Duration;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Smallest accepted sampling interval in milliseconds.
pub const MIN_SAMPLING_INTERVAL_MS: u64 = 1000;

/// Largest accepted sampling interval in milliseconds.
pub const MAX_SAMPLING_INTERVAL_MS: u64 = 5000;

/// Which directions a run measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestDirection {
    /// Download only
    Download,
    /// Upload only
    Upload,
    /// Download and upload at the same time
    Both,
}

impl TestDirection {
    /// Directions that have a driver and a window in this run.
    pub fn directions(&self) -> &'static [Direction] {
        match self {
            TestDirection::Download => &[Direction::Download],
            TestDirection::Upload => &[Direction::Upload],
            TestDirection::Both => &[Direction::Download, Direction::Upload],
        }
    }

    pub fn includes(&self, direction: Direction) -> bool {
        self.directions().contains(&direction)
    }

    /// Human readable test type used in exports.
    pub fn label(&self) -> &'static str {
        match self {
            TestDirection::Download => "Download Only",
            TestDirection::Upload => "Upload Only",
            TestDirection::Both => "Download & Upload",
        }
    }
}

/// Validate a sampling interval given in milliseconds.
pub fn sampling_interval(ms: u64) -> Result<Duration, SpeedTestError> {
    if !(MIN_SAMPLING_INTERVAL_MS..=MAX_SAMPLING_INTERVAL_MS).contains(&ms) {
        return Err(SpeedTestError::config(format!(
            "sampling interval must be between {} and {} ms, got {}",
            MIN_SAMPLING_INTERVAL_MS, MAX_SAMPLING_INTERVAL_MS, ms
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Configuration of the probe executor.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Download endpoints, primary first.
    pub download_endpoints: Vec<Endpoint>,

    /// Upload endpoints, primary first.
    pub upload_endpoints: Vec<Endpoint>,

    /// Probe size at which a download is split into sub-transfers.
    /// Default: 5 MiB
    pub download_split_threshold: u64,

    /// Probe size at which an upload is split into sub-transfers.
    /// Default: 20 MiB
    pub upload_split_threshold: u64,

    /// Number of concurrent sub-transfers of a split probe.
    /// Default: 4
    pub split_parts: usize,

    /// Sub-transfers that must succeed for a split probe to count.
    /// Default: 2
    pub split_min_successes: usize,

    /// Uploads up to this size use fully random payloads; larger ones
    /// repeat a random block.
    /// Default: 10 MiB
    pub random_payload_limit: u64,

    /// Timeout of a single transfer.
    /// Default: 60s
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            download_endpoints: default_download_endpoints(),
            upload_endpoints: default_upload_endpoints(),
            download_split_threshold: 5 * MIB,
            upload_split_threshold: 20 * MIB,
            split_parts: 4,
            split_min_successes: 2,
            random_payload_limit: 10 * MIB,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ProbeConfig {
    pub fn endpoints(&self, direction: Direction) -> &[Endpoint] {
        match direction {
            Direction::Download => &self.download_endpoints,
            Direction::Upload => &self.upload_endpoints,
        }
    }

    pub fn split_threshold(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Download => self.download_split_threshold,
            Direction::Upload => self.upload_split_threshold,
        }
    }
}

/// Configuration of the ping sampler.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Endpoints timed on every sample.
    pub endpoints: Vec<Endpoint>,

    /// Plausible latency range in ms, inclusive.
    /// Default: 5..=5000
    pub min_plausible_ms: f64,
    pub max_plausible_ms: f64,

    /// Timeout of a single ping request.
    /// Default: 5s
    pub timeout: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            endpoints: default_ping_endpoints(),
            min_plausible_ms: 5.0,
            max_plausible_ms: 5000.0,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration of the continuous test driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Probes kept in flight per direction.
    /// Default: 2
    pub target_concurrency: usize,

    /// Cadence of the deficit check.
    /// Default: 500ms
    pub schedule_interval: Duration,

    /// Progressive download probe sizes, ascending.
    /// Default: 1, 5, 10, 25, 50 MiB
    pub download_sizes: Vec<u64>,

    /// Progressive upload probe sizes, ascending.
    /// Default: 10, 20, 35, 50 MiB
    pub upload_sizes: Vec<u64>,

    /// Insert a flagged synthetic sample when every endpoint failed.
    /// Default: true
    pub simulate_on_exhaustion: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target_concurrency: 2,
            schedule_interval: Duration::from_millis(500),
            download_sizes: vec![MIB, 5 * MIB, 10 * MIB, 25 * MIB, 50 * MIB],
            upload_sizes: vec![10 * MIB, 20 * MIB, 35 * MIB, 50 * MIB],
            simulate_on_exhaustion: true,
        }
    }
}

impl DriverConfig {
    pub fn sizes(&self, direction: Direction) -> &[u64] {
        match direction {
            Direction::Download => &self.download_sizes,
            Direction::Upload => &self.upload_sizes,
        }
    }
}

/// Configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directions to measure.
    /// Default: both
    pub direction: TestDirection,

    /// Total run duration, zero for a continuous run.
    /// Default: 0 (continuous)
    pub duration: Duration,

    /// Cadence of measurement records.
    /// Default: 3000ms
    pub sampling_interval: Duration,

    /// Retention horizon of the sample windows in ms.
    /// Default: 5000ms
    pub window_horizon_ms: f64,

    /// A direction with no settled probe for this long loses its reading.
    /// Must exceed the longest a successful probe can take, which the
    /// request timeout bounds.
    /// Default: 90s
    pub stale_after: Duration,

    pub driver: DriverConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            direction: TestDirection::Both,
            duration: Duration::ZERO,
            sampling_interval: Duration::from_millis(3000),
            window_horizon_ms: crate::measurements::DEFAULT_WINDOW_HORIZON_MS,
            stale_after: Duration::from_secs(90),
            driver: DriverConfig::default(),
        }
    }
}

impl RunConfig {
    /// Whether the run only ends on an explicit stop.
    pub fn is_continuous(&self) -> bool {
        self.duration.is_zero()
    }

    /// Check values that the CLI parser cannot express on its own.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        sampling_interval(self.sampling_interval.as_millis() as u64)?;

        if self.driver.target_concurrency == 0 {
            return Err(SpeedTestError::config(
                "target concurrency must be at least 1",
            ));
        }

        for direction in self.direction.directions() {
            let sizes = self.driver.sizes(*direction);
            if sizes.is_empty() {
                return Err(SpeedTestError::config(format!(
                    "no probe sizes configured for {}",
                    direction
                )));
            }
            if sizes.windows(2).any(|pair| pair[0] > pair[1]) {
                return Err(SpeedTestError::config(format!(
                    "{} probe sizes must be ascending",
                    direction
                )));
            }
        }

        Ok(())
    }
}
