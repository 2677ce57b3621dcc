//! Dashboard rendering using ratatui.
//!
//! A header with the run settings, a row of current readings, a live
//! throughput chart and a status bar with the key bindings. Narrow
//! terminals get a text-only layout.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use super::progress::RunPhase;
use super::state::{ErrorInfo, SeriesState, TuiState};
use crate::speedtest::Direction;

const DOWNLOAD_COLOR: Color = Color::Cyan;
const UPLOAD_COLOR: Color = Color::Magenta;

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
pub fn speed_color(speed_mbps: f64) -> Color {
    if speed_mbps >= 100.0 {
        Color::Green
    } else if speed_mbps >= 25.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.1} ms", latency_ms)
}

/// Reading text of a series, `--` while there is no value. Synthetic
/// values carry a `*` marker.
pub fn format_reading(series: &SeriesState, format: fn(f64) -> String) -> String {
    match series.current {
        Some(value) if series.simulated => format!("{}*", format(value)),
        Some(value) => format(value),
        None => "--".to_string(),
    }
}

/// Elapsed time as `mm:ss`, with the configured duration when bounded.
pub fn format_elapsed(elapsed_sec: f64, duration_secs: u64) -> String {
    let elapsed = elapsed_sec.max(0.0) as u64;
    let clock = format!("{:02}:{:02}", elapsed / 60, elapsed % 60);

    if duration_secs == 0 {
        clock
    } else {
        format!(
            "{} / {:02}:{:02}",
            clock,
            duration_secs / 60,
            duration_secs % 60
        )
    }
}

/// Minimal mode threshold in columns.
const MINIMAL_MODE_THRESHOLD: u16 = 60;

pub fn is_minimal_mode(width: u16) -> bool {
    width < MINIMAL_MODE_THRESHOLD
}

/// Render the dashboard, choosing the layout from the frame width.
pub fn render_frame(frame: &mut Frame, state: &TuiState) {
    if is_minimal_mode(frame.area().width) {
        render_minimal_frame(frame, state);
    } else {
        render_normal_frame(frame, state);
    }
}

fn render_normal_frame(frame: &mut Frame, state: &TuiState) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Header
            Constraint::Length(2), // Readings
            Constraint::Min(8),    // Chart or error
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header(frame, chunks[0], state);
    render_readings(frame, chunks[1], state);

    match &state.error {
        Some(error) => render_error(frame, chunks[2], error),
        None => render_chart(frame, chunks[2], state),
    }

    render_status_bar(frame, chunks[3], state);
}

fn render_minimal_frame(frame: &mut Frame, state: &TuiState) {
    let mut lines = vec![Line::from(Span::styled(
        phase_label(state.phase),
        phase_style(state.phase),
    ))];

    if state.direction.includes(Direction::Download) {
        lines.push(reading_line("DL ", &state.download, format_speed, true));
    }
    if state.direction.includes(Direction::Upload) {
        lines.push(reading_line("UL ", &state.upload, format_speed, true));
    }
    lines.push(reading_line("Ping ", &state.ping, format_latency, false));

    if let Some(error) = &state.error {
        lines.push(Line::from(Span::styled(
            format!("Error: {}", error.message),
            Style::default().fg(Color::Red),
        )));
    }

    frame.render_widget(Paragraph::new(lines), frame.area());
}

fn phase_label(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Idle => "◐ Starting...",
        RunPhase::Running => "▶ Measuring",
        RunPhase::Stopped => "■ Stopped",
    }
}

fn phase_style(phase: RunPhase) -> Style {
    let color = match phase {
        RunPhase::Running => Color::Green,
        _ => Color::Yellow,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn label_style() -> Style {
    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
}

fn reading_line(
    label: &'static str,
    series: &SeriesState,
    format: fn(f64) -> String,
    graded: bool,
) -> Line<'static> {
    let color = match series.current {
        Some(value) if graded => speed_color(value),
        Some(_) => Color::White,
        None => Color::DarkGray,
    };

    Line::from(vec![
        Span::styled(label, label_style()),
        Span::styled(format_reading(series, format), Style::default().fg(color)),
    ])
}

/// Render the header line with phase and run settings.
pub fn render_header(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = Line::from(vec![
        Span::styled(phase_label(state.phase), phase_style(state.phase)),
        Span::raw("  "),
        Span::styled("Test: ", label_style()),
        Span::styled(state.direction.label(), Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled("Interval: ", label_style()),
        Span::styled(
            format!("{} ms", state.sampling_interval_ms),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled("Elapsed: ", label_style()),
        Span::styled(
            format_elapsed(state.elapsed_sec, state.duration_secs),
            Style::default().fg(Color::Cyan),
        ),
    ]);

    frame.render_widget(Paragraph::new(line), inner);
}

/// Render the current download, upload and ping readings.
pub fn render_readings(frame: &mut Frame, area: Rect, state: &TuiState) {
    let mut spans = Vec::new();

    if state.direction.includes(Direction::Download) {
        spans.extend(
            reading_line("Download: ", &state.download, format_speed, true)
                .spans,
        );
        spans.push(Span::raw("   "));
    }
    if state.direction.includes(Direction::Upload) {
        spans.extend(
            reading_line("Upload: ", &state.upload, format_speed, true).spans,
        );
        spans.push(Span::raw("   "));
    }
    spans.extend(
        reading_line("Ping: ", &state.ping, format_latency, false).spans,
    );

    let mut lines = vec![Line::from(spans)];

    if [&state.download, &state.upload, &state.ping]
        .iter()
        .any(|series| series.simulated)
    {
        lines.push(Line::from(Span::styled(
            "* simulated value, no live measurement was available",
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

/// Render the throughput chart over the run.
pub fn render_chart(frame: &mut Frame, area: Rect, state: &TuiState) {
    let mut datasets = Vec::new();

    if state.direction.includes(Direction::Download) {
        datasets.push(
            Dataset::default()
                .name("Download")
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(DOWNLOAD_COLOR))
                .data(&state.download.history),
        );
    }
    if state.direction.includes(Direction::Upload) {
        datasets.push(
            Dataset::default()
                .name("Upload")
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(UPLOAD_COLOR))
                .data(&state.upload.history),
        );
    }

    let [start, end] = state.time_bounds();
    let ceiling = state.speed_ceiling();
    let axis_style = Style::default().fg(Color::DarkGray);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(" Throughput ")
                .borders(Borders::ALL)
                .border_style(axis_style),
        )
        .x_axis(
            Axis::default()
                .title("s")
                .style(axis_style)
                .bounds([start, end])
                .labels([format!("{:.0}", start), format!("{:.0}", end)]),
        )
        .y_axis(
            Axis::default()
                .title("Mbps")
                .style(axis_style)
                .bounds([0.0, ceiling])
                .labels([
                    "0".to_string(),
                    format!("{:.0}", ceiling / 2.0),
                    format!("{:.0}", ceiling),
                ]),
        );

    frame.render_widget(chart, area);
}

/// Render the status bar with key hints.
pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &TuiState) {
    let text = match state.phase {
        RunPhase::Stopped => "Run stopped.".to_string(),
        _ => format!(
            "{} samples  [q] stop  [+/-] interval",
            state.ticks
        ),
    };

    let paragraph =
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}

fn render_error(frame: &mut Frame, area: Rect, error: &ErrorInfo) {
    let mut lines = vec![Line::from(Span::styled(
        format!("Error: {}", error.message),
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    ))];

    if let Some(suggestion) = &error.suggestion {
        lines.push(Line::from(Span::styled(
            format!("Suggestion: {}", suggestion),
            Style::default().fg(Color::Yellow),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}
