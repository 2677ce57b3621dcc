//! The continuous measurement engine.
//!
//! Probes run against public HTTP endpoints, settle into per-direction
//! sample windows, and the orchestrator turns the windows into one
//! measurement record per sampling tick.

use crate::errors::SpeedTestError;
use crate::measurements::{is_plausible_mbps, throughput_mbps};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub mod download;
pub mod driver;
pub mod endpoints;
pub mod engine;
pub mod ping;
pub mod probe;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_server;

pub(crate) const UA: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// Bytes moved by one transfer and the time the transfer took.
///
/// For downloads the clock covers the body stream only; for uploads it
/// runs from just before the request is sent until the response status
/// is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeMeasurement {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ProbeMeasurement {
    pub const fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    pub fn mbps(&self) -> f64 {
        throughput_mbps(self.bytes, self.elapsed)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Reject measurements whose throughput is outside `(0, 10000)` Mbps.
    pub fn validate(self) -> Result<Self, SpeedTestError> {
        let mbps = self.mbps();

        if is_plausible_mbps(mbps) {
            Ok(self)
        } else {
            Err(SpeedTestError::validation(format!(
                "implausible throughput {:.2} Mbps ({} bytes in {:.1} ms)",
                mbps,
                self.bytes,
                self.elapsed_ms()
            )))
        }
    }
}

/// One timed transfer against a remote endpoint.
///
/// Implementations are stateless apart from their transport and must not
/// touch any sample window; the driver decides what a result means.
pub trait ProbeExecutor: Send + Sync + 'static {
    fn run_probe(
        &self,
        direction: Direction,
        bytes: u64,
    ) -> impl Future<Output = Result<ProbeMeasurement, SpeedTestError>> + Send;
}

/// Latency reading of one ping sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingReading {
    pub ms: f64,
    /// True when no endpoint produced a plausible value
    pub simulated: bool,
}

/// Source of latency readings for the orchestrator.
pub trait PingSource: Send + Sync + 'static {
    fn measure_ping(&self) -> impl Future<Output = PingReading> + Send;
}
