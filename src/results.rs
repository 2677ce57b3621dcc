//! Result data structures for run output.
//!
//! [`RunStatistics`] summarizes the records of a run and is shared by the
//! display layer and the CSV export. [`RunResults`] is the serializable
//! view printed in JSON mode.

use crate::config::TestDirection;
use crate::speedtest::driver::DriverReport;
use crate::speedtest::engine::{CompletedRun, MeasurementRecord};
use crate::stats::MetricSummary;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;

/// Average, maximum and minimum of every metric of a run.
///
/// Absent throughput values are skipped, so a direction without any
/// reading has no summary at all rather than a zero one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Number of records
    pub ticks: usize,
    /// Records carrying at least one synthetic value
    pub simulated_ticks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<MetricSummary>,
}

impl RunStatistics {
    pub fn from_records(records: &[MeasurementRecord]) -> Self {
        Self {
            ticks: records.len(),
            simulated_ticks: records
                .iter()
                .filter(|record| record.simulated.any())
                .count(),
            download: MetricSummary::from_series(
                records.iter().map(|record| record.download_mbps),
            ),
            upload: MetricSummary::from_series(
                records.iter().map(|record| record.upload_mbps),
            ),
            ping: MetricSummary::from_series(
                records.iter().map(|record| Some(record.ping_ms)),
            ),
        }
    }
}

/// Complete output of a run in JSON mode.
#[derive(Debug, Clone, Serialize)]
pub struct RunResults {
    pub started_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Local>>,
    pub test_type: TestDirection,
    /// Configured duration, absent for a continuous run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub sampling_interval_ms: u64,
    pub statistics: RunStatistics,
    pub probes: DriverReport,
    /// Path of the CSV export, when one was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<String>,
    pub records: Vec<MeasurementRecord>,
}

impl RunResults {
    pub fn from_completed(
        completed: &CompletedRun,
        export_path: Option<&Path>,
    ) -> Self {
        let run = &completed.run;

        Self {
            started_at: run.started_at,
            ended_at: run.ended_at,
            test_type: run.direction,
            duration_secs: (!run.is_continuous())
                .then(|| run.duration.as_secs()),
            sampling_interval_ms: run.sampling_interval.as_millis() as u64,
            statistics: completed.statistics.clone(),
            probes: completed.probes.clone(),
            export_path: export_path.map(|path| path.display().to_string()),
            records: run.records.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
