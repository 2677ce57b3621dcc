//! CSV export of a completed run.
//!
//! The file starts with a metadata block, followed by one row per
//! measurement record and a summary block. Absent throughput values are
//! written as empty cells. A trailing `Simulated` column is only added
//! when the run contains synthetic values.

use crate::errors::SpeedTestError;
use crate::speedtest::engine::{CompletedRun, MeasurementRecord};
use crate::stats::MetricSummary;
use chrono::{DateTime, SecondsFormat, TimeZone};
use log::info;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str =
    "Timestamp,Relative_Time_Seconds,Download_Mbps,Upload_Mbps,Ping_ms";

/// File name of the export for a run started at `started_at`.
pub fn export_filename<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    started_at.format("speedtest_%Y-%m-%d_%H-%M-%S.csv").to_string()
}

fn timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    time.to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

fn summary_row(out: &mut String, name: &str, summary: Option<&MetricSummary>) {
    let _ = match summary {
        Some(s) => writeln!(
            out,
            "{},{:.2},{:.2},{:.2}",
            name, s.average, s.maximum, s.minimum
        ),
        None => writeln!(out, "{},N/A,N/A,N/A", name),
    };
}

fn data_row(out: &mut String, record: &MeasurementRecord, with_flags: bool) {
    let _ = write!(
        out,
        "{},{:.1},{},{},{:.1}",
        timestamp(&record.timestamp),
        record.relative_time_sec,
        cell(record.download_mbps),
        cell(record.upload_mbps),
        record.ping_ms
    );

    if with_flags {
        let _ = write!(out, ",{}", record.simulated.labels().join(";"));
    }

    out.push('\n');
}

/// Render a completed run as CSV text.
pub fn render_csv(completed: &CompletedRun) -> String {
    let run = &completed.run;
    let with_flags = run.has_simulated_values();
    let mut out = String::new();

    let duration = if run.is_continuous() {
        "Continuous".to_string()
    } else {
        format!("{} seconds", run.duration.as_secs())
    };

    let _ = writeln!(out, "Speed Test Results");
    let _ = writeln!(out, "Test Type,{}", run.direction.label());
    let _ = writeln!(out, "Duration,{}", duration);
    let _ = writeln!(
        out,
        "Sampling Interval,{} ms",
        run.sampling_interval.as_millis()
    );
    let _ = writeln!(out, "Start Time,{}", timestamp(&run.started_at));
    let _ = writeln!(
        out,
        "End Time,{}",
        run.ended_at.as_ref().map(timestamp).unwrap_or_default()
    );
    out.push('\n');

    out.push_str(CSV_HEADER);
    if with_flags {
        out.push_str(",Simulated");
    }
    out.push('\n');

    for record in &run.records {
        data_row(&mut out, record, with_flags);
    }
    out.push('\n');

    let statistics = &completed.statistics;
    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "Metric,Average,Maximum,Minimum");
    summary_row(&mut out, "Download_Mbps", statistics.download.as_ref());
    summary_row(&mut out, "Upload_Mbps", statistics.upload.as_ref());
    summary_row(&mut out, "Ping_ms", statistics.ping.as_ref());

    out
}

/// Write the run to `dir`, creating the directory when missing.
pub fn write_csv(
    completed: &CompletedRun,
    dir: &Path,
) -> Result<PathBuf, SpeedTestError> {
    let path = dir.join(export_filename(&completed.run.started_at));

    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, render_csv(completed)))
        .map_err(|e| {
            SpeedTestError::export(format!(
                "could not write {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;

    info!(
        "Exported {} records to {}",
        completed.run.records.len(),
        path.display()
    );

    Ok(path)
}
