//! Run orchestration.
//!
//! The orchestrator owns the lifecycle of a run: it starts the continuous
//! driver, turns the sample windows into one [`MeasurementRecord`] per
//! sampling tick, and finalizes the run when it stops. Ticks are driven by
//! the orchestrator's own clock, independent of probe completion.

use crate::config::{sampling_interval, RunConfig, TestDirection};
use crate::errors::SpeedTestError;
use crate::measurements::{SampleWindow, WindowReading};
use crate::results::RunStatistics;
use crate::speedtest::driver::{
    ContinuousDriver, DriverHandle, DriverReport, SharedWindow,
};
use crate::speedtest::{Direction, PingSource, ProbeExecutor};
use crate::tui::progress::{ProgressCallback, ProgressEvent, RunPhase};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{
    interval_at, sleep_until, Instant, Interval, MissedTickBehavior,
};

/// Which values of a record are synthetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatedFlags {
    pub download: bool,
    pub upload: bool,
    pub ping: bool,
}

impl SimulatedFlags {
    pub fn any(&self) -> bool {
        self.download || self.upload || self.ping
    }

    /// Names of the synthetic values, for the export column.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.download {
            labels.push("download");
        }
        if self.upload {
            labels.push("upload");
        }
        if self.ping {
            labels.push("ping");
        }
        labels
    }
}

/// One row of a run, taken on every sampling tick.
///
/// Throughput values are `None` when their window held no samples at the
/// tick; an absent value is never the same as zero throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Local>,
    /// Seconds since the run started
    pub relative_time_sec: f64,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub ping_ms: f64,
    pub simulated: SimulatedFlags,
}

/// Point of the live throughput chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphPoint {
    pub time_sec: f64,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
}

/// Control messages accepted by [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    /// New sampling interval in milliseconds
    SetInterval(u64),
}

/// State of one measurement session.
#[derive(Debug)]
pub struct Run {
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub direction: TestDirection,
    /// Zero for a continuous run
    pub duration: Duration,
    pub sampling_interval: Duration,
    pub records: Vec<MeasurementRecord>,
    pub graph: Vec<GraphPoint>,
    clock: Instant,
    windows: Vec<(Direction, SharedWindow)>,
}

impl Run {
    fn new(config: &RunConfig) -> Self {
        let windows = config
            .direction
            .directions()
            .iter()
            .map(|direction| {
                let window = SampleWindow::new(config.window_horizon_ms);
                (*direction, Arc::new(Mutex::new(window)))
            })
            .collect();

        Self {
            started_at: Local::now(),
            ended_at: None,
            direction: config.direction,
            duration: config.duration,
            sampling_interval: config.sampling_interval,
            records: Vec::new(),
            graph: Vec::new(),
            clock: Instant::now(),
            windows,
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.duration.is_zero()
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Whether any record carries a synthetic value.
    pub fn has_simulated_values(&self) -> bool {
        self.records.iter().any(|record| record.simulated.any())
    }

    #[cfg(test)]
    pub fn window(&self, direction: Direction) -> Option<&SharedWindow> {
        self.windows
            .iter()
            .find(|(d, _)| *d == direction)
            .map(|(_, window)| window)
    }

    /// A run with the given records and no live windows.
    #[cfg(test)]
    pub(crate) fn fixture(
        config: &RunConfig,
        started_at: DateTime<Local>,
        records: Vec<MeasurementRecord>,
    ) -> Self {
        let graph = records
            .iter()
            .map(|record| GraphPoint {
                time_sec: record.relative_time_sec,
                download_mbps: record.download_mbps,
                upload_mbps: record.upload_mbps,
            })
            .collect();

        Self {
            started_at,
            records,
            graph,
            windows: Vec::new(),
            ..Self::new(config)
        }
    }
}

/// A finished run with its final statistics.
#[derive(Debug)]
pub struct CompletedRun {
    pub run: Run,
    pub statistics: RunStatistics,
    pub probes: DriverReport,
}

/// Take the current reading of a window.
///
/// Retention follows the newest sample, so a slow link whose probes
/// outlast the horizon keeps its last reading until the next probe
/// settles. Only a direction silent for longer than `stale_after_ms` is
/// aged against the tick's clock.
fn read_window(
    window: &SharedWindow,
    now_ms: f64,
    stale_after_ms: f64,
) -> Result<Option<WindowReading>, SpeedTestError> {
    let mut window = window.lock().map_err(|_| {
        SpeedTestError::critical("sample window lock poisoned")
    })?;

    if window.is_stale(now_ms, stale_after_ms) {
        window.prune(now_ms);
    }
    Ok(window.reading())
}

/// Sampling timer whose first tick is at `first`.
fn sampling_timer(first: Instant, interval: Duration) -> Interval {
    let mut timer = interval_at(first, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

enum State {
    Idle,
    Running { run: Run, driver: DriverHandle },
    Stopped,
}

/// Lifecycle owner of measurement runs.
pub struct Orchestrator<P, L> {
    executor: Arc<P>,
    ping: L,
    config: RunConfig,
    progress: Arc<dyn ProgressCallback>,
    state: State,
}

impl<P: ProbeExecutor, L: PingSource> Orchestrator<P, L> {
    pub fn new(
        executor: P,
        ping: L,
        config: RunConfig,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            ping,
            config,
            progress,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        match self.state {
            State::Idle => RunPhase::Idle,
            State::Running { .. } => RunPhase::Running,
            State::Stopped => RunPhase::Stopped,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The active run, if any.
    #[cfg(test)]
    pub fn current_run(&self) -> Option<&Run> {
        match &self.state {
            State::Running { run, .. } => Some(run),
            _ => None,
        }
    }

    /// Start a fresh run and take its first sample immediately.
    ///
    /// Fails with a configuration error while another run is active.
    pub async fn start(&mut self) -> Result<(), SpeedTestError> {
        if matches!(self.state, State::Running { .. }) {
            return Err(SpeedTestError::config("a run is already active"));
        }

        self.config.validate()?;

        let run = Run::new(&self.config);
        let driver = ContinuousDriver::new(
            Arc::clone(&self.executor),
            self.config.driver.clone(),
            run.windows.clone(),
            run.clock,
        )
        .spawn();

        info!(
            "Run started: {}, {}, sampling every {:?}",
            run.direction.label(),
            if run.is_continuous() {
                "continuous".to_string()
            } else {
                format!("{}s", run.duration.as_secs())
            },
            run.sampling_interval
        );

        self.progress.on_progress(ProgressEvent::PhaseChange(RunPhase::Running));
        self.progress.on_progress(ProgressEvent::RunStarted {
            direction: run.direction,
            duration: run.duration,
            sampling_interval: run.sampling_interval,
        });

        self.state = State::Running { run, driver };
        self.tick().await?;

        Ok(())
    }

    /// Take one sample of the active run.
    ///
    /// Every call appends exactly one record and one graph point. A window
    /// that cannot be read is reported and recorded as absent.
    pub async fn tick(&mut self) -> Result<MeasurementRecord, SpeedTestError> {
        let stale_after_ms = self.config.stale_after.as_secs_f64() * 1000.0;
        let State::Running { run, .. } = &mut self.state else {
            return Err(SpeedTestError::config("no active run to sample"));
        };

        let now = run.clock.elapsed();
        let now_ms = now.as_secs_f64() * 1000.0;

        let mut download = None;
        let mut upload = None;

        for (direction, window) in &run.windows {
            let reading = match read_window(window, now_ms, stale_after_ms) {
                Ok(reading) => reading,
                Err(e) => {
                    error!("Reading the {} window failed: {}", direction, e);
                    self.progress.on_progress(ProgressEvent::Error(format!(
                        "{} reading unavailable: {}",
                        direction, e.message
                    )));
                    None
                }
            };

            match direction {
                Direction::Download => download = reading,
                Direction::Upload => upload = reading,
            }
        }

        let ping = self.ping.measure_ping().await;

        let record = MeasurementRecord {
            timestamp: Local::now(),
            relative_time_sec: now.as_secs_f64(),
            download_mbps: download.map(|reading| reading.mbps),
            upload_mbps: upload.map(|reading| reading.mbps),
            ping_ms: ping.ms,
            simulated: SimulatedFlags {
                download: download.is_some_and(|reading| reading.simulated),
                upload: upload.is_some_and(|reading| reading.simulated),
                ping: ping.simulated,
            },
        };

        run.graph.push(GraphPoint {
            time_sec: record.relative_time_sec,
            download_mbps: record.download_mbps,
            upload_mbps: record.upload_mbps,
        });
        run.records.push(record.clone());

        self.progress.on_progress(ProgressEvent::Tick {
            index: run.records.len() - 1,
            record: record.clone(),
        });

        Ok(record)
    }

    /// Change the sampling interval, in milliseconds.
    ///
    /// Values outside 1000..=5000 are rejected and leave the interval
    /// unchanged.
    pub fn set_sampling_interval(
        &mut self,
        ms: u64,
    ) -> Result<Duration, SpeedTestError> {
        let interval = sampling_interval(ms)?;

        self.config.sampling_interval = interval;
        if let State::Running { run, .. } = &mut self.state {
            run.sampling_interval = interval;
        }

        info!("Sampling interval set to {:?}", interval);
        self.progress.on_progress(ProgressEvent::IntervalChanged(interval));

        Ok(interval)
    }

    /// Stop the active run and return it with its final statistics.
    ///
    /// Returns `None` when no run is active, so repeated calls are
    /// harmless. Probes still in flight are abandoned and their results
    /// never reach the run.
    pub async fn stop(&mut self) -> Option<CompletedRun> {
        if !matches!(self.state, State::Running { .. }) {
            return None;
        }

        let State::Running { mut run, driver } =
            std::mem::replace(&mut self.state, State::Stopped)
        else {
            return None;
        };

        let probes = match driver.join().await {
            Ok(report) => report,
            Err(e) => {
                error!("{}", e);
                self.progress.on_progress(ProgressEvent::Error(e.message));
                DriverReport::default()
            }
        };

        run.ended_at = Some(Local::now());
        let statistics = RunStatistics::from_records(&run.records);

        info!(
            "Run stopped after {} samples ({:.1}s)",
            statistics.ticks,
            run.elapsed().as_secs_f64()
        );

        self.progress.on_progress(ProgressEvent::PhaseChange(RunPhase::Stopped));
        self.progress.on_progress(ProgressEvent::Finished(statistics.clone()));

        Some(CompletedRun { run, statistics, probes })
    }

    /// Start a run and sample it until the duration elapses or a stop
    /// command arrives.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<CompletedRun, SpeedTestError> {
        self.start().await?;

        let State::Running { run, .. } = &self.state else {
            return Err(SpeedTestError::critical("run did not start"));
        };
        let clock = run.clock;

        let interval = self.config.sampling_interval;
        let mut ticker = sampling_timer(clock + interval, interval);
        let bounded = !self.config.is_continuous();
        let deadline = sleep_until(clock + self.config.duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline, if bounded => {
                    info!("Run duration of {:?} reached", self.config.duration);
                    break;
                }
                command = commands.recv() => match command {
                    Some(Command::Stop) => {
                        info!("Stop requested");
                        break;
                    }
                    Some(Command::SetInterval(ms)) => {
                        match self.set_sampling_interval(ms) {
                            Ok(interval) => {
                                ticker = sampling_timer(
                                    Instant::now() + interval,
                                    interval,
                                )
                            }
                            Err(e) => {
                                warn!("{}", e);
                                self.progress
                                    .on_progress(ProgressEvent::Error(e.message));
                            }
                        }
                    }
                    None => {
                        info!("Command channel closed, stopping");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.tick().await?;
                }
            }
        }

        self.stop()
            .await
            .ok_or_else(|| SpeedTestError::critical("run ended while not active"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::speedtest::{PingReading, ProbeMeasurement};
    use crate::tui::progress::RecordingProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Download alternates between 50 Mbps and a transport failure;
    /// upload always reports 20 Mbps. Every probe takes one second.
    #[derive(Default)]
    struct AlternatingExecutor {
        download_calls: AtomicUsize,
    }

    impl ProbeExecutor for AlternatingExecutor {
        async fn run_probe(
            &self,
            direction: Direction,
            _bytes: u64,
        ) -> Result<ProbeMeasurement, SpeedTestError> {
            sleep(Duration::from_secs(1)).await;

            match direction {
                Direction::Download => {
                    let n = self.download_calls.fetch_add(1, Ordering::SeqCst);
                    if n % 2 == 0 {
                        // 6.25 MB in one second
                        Ok(ProbeMeasurement::new(6_250_000, Duration::from_secs(1)))
                    } else {
                        Err(SpeedTestError::network("connection reset"))
                    }
                }
                // 2.5 MB in one second
                Direction::Upload => {
                    Ok(ProbeMeasurement::new(2_500_000, Duration::from_secs(1)))
                }
            }
        }
    }

    /// Every probe fails with the given kind.
    struct FailingExecutor(ErrorKind);

    impl ProbeExecutor for FailingExecutor {
        async fn run_probe(
            &self,
            _direction: Direction,
            _bytes: u64,
        ) -> Result<ProbeMeasurement, SpeedTestError> {
            sleep(Duration::from_millis(200)).await;
            Err(SpeedTestError::new(self.0, "scripted failure"))
        }
    }

    /// A link with constant throughput: every probe succeeds and lasts
    /// exactly as long as its size takes at `mbps`.
    struct SteadyExecutor {
        mbps: f64,
    }

    impl ProbeExecutor for SteadyExecutor {
        async fn run_probe(
            &self,
            _direction: Direction,
            bytes: u64,
        ) -> Result<ProbeMeasurement, SpeedTestError> {
            let elapsed =
                Duration::from_secs_f64(bytes as f64 * 8.0 / (self.mbps * 1e6));
            sleep(elapsed).await;
            Ok(ProbeMeasurement::new(bytes, elapsed))
        }
    }

    struct FixedPing(f64);

    impl PingSource for FixedPing {
        async fn measure_ping(&self) -> PingReading {
            PingReading { ms: self.0, simulated: false }
        }
    }

    /// The first probe succeeds at 40 Mbps after one second; every later
    /// probe never settles.
    #[derive(Default)]
    struct StallingExecutor {
        calls: AtomicUsize,
    }

    impl ProbeExecutor for StallingExecutor {
        async fn run_probe(
            &self,
            _direction: Direction,
            _bytes: u64,
        ) -> Result<ProbeMeasurement, SpeedTestError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                std::future::pending::<()>().await;
            }
            sleep(Duration::from_secs(1)).await;
            Ok(ProbeMeasurement::new(5_000_000, Duration::from_secs(1)))
        }
    }

    /// Answers after a fixed delay.
    struct SlowPing(Duration);

    impl PingSource for SlowPing {
        async fn measure_ping(&self) -> PingReading {
            sleep(self.0).await;
            PingReading { ms: 25.0, simulated: false }
        }
    }

    fn orchestrator<P: ProbeExecutor>(
        executor: P,
        config: RunConfig,
    ) -> (Orchestrator<P, FixedPing>, Arc<RecordingProgress>) {
        let progress = Arc::new(RecordingProgress::default());
        let orchestrator = Orchestrator::new(
            executor,
            FixedPing(25.0),
            config,
            Arc::clone(&progress) as Arc<dyn ProgressCallback>,
        );
        (orchestrator, progress)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_intermittent_failures() {
        let (mut orchestrator, progress) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        orchestrator.start().await.unwrap();
        for _ in 0..9 {
            sleep(Duration::from_millis(3000)).await;
            orchestrator.tick().await.unwrap();
        }
        let completed = orchestrator.stop().await.unwrap();

        let run = &completed.run;
        assert_eq!(run.records.len(), 10);
        assert_eq!(run.graph.len(), 10);
        assert!(run.ended_at.is_some());

        // The first sample is taken before any probe settled.
        assert_eq!(run.records[0].download_mbps, None);
        assert_eq!(run.records[0].upload_mbps, None);

        assert!(run
            .records
            .iter()
            .all(|record| record.download_mbps != Some(0.0)));
        assert!(run.records[1..]
            .iter()
            .all(|record| record.download_mbps == Some(50.0)));

        let upload = completed.statistics.upload.unwrap();
        assert!((upload.average - 20.0).abs() < 0.01);
        assert_eq!(upload.count, 9);
        assert!(!run.has_simulated_values());

        let ticks = progress
            .events()
            .iter()
            .filter(|event| matches!(event, ProgressEvent::Tick { .. }))
            .count();
        assert_eq!(ticks, 10);
        assert_eq!(orchestrator.phase(), RunPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relative_time_follows_the_run_clock() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        orchestrator.start().await.unwrap();
        sleep(Duration::from_millis(3000)).await;
        orchestrator.tick().await.unwrap();
        let completed = orchestrator.stop().await.unwrap();

        let times: Vec<f64> = completed
            .run
            .graph
            .iter()
            .map(|point| (point.time_sec * 10.0).round() / 10.0)
            .collect();
        assert_eq!(times, vec![0.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_record_absent_values() {
        let mut config = RunConfig::default();
        config.driver.simulate_on_exhaustion = false;
        let (mut orchestrator, _) =
            orchestrator(FailingExecutor(ErrorKind::Exhausted), config);

        orchestrator.start().await.unwrap();
        for _ in 0..4 {
            sleep(Duration::from_millis(3000)).await;
            orchestrator.tick().await.unwrap();
        }
        let completed = orchestrator.stop().await.unwrap();

        assert_eq!(completed.run.records.len(), 5);
        for record in &completed.run.records {
            assert_eq!(record.download_mbps, None);
            assert_eq!(record.upload_mbps, None);
            assert!(!record.simulated.any());
        }
        assert!(completed.statistics.download.is_none());
        assert!(completed.statistics.ping.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_produces_flagged_values() {
        let (mut orchestrator, _) = orchestrator(
            FailingExecutor(ErrorKind::Exhausted),
            RunConfig::default(),
        );

        orchestrator.start().await.unwrap();
        sleep(Duration::from_millis(3000)).await;
        let record = orchestrator.tick().await.unwrap();
        let completed = orchestrator.stop().await.unwrap();

        assert!(record.download_mbps.is_some());
        assert!(record.upload_mbps.is_some());
        assert!(record.simulated.download);
        assert!(record.simulated.upload);
        assert!(!record.simulated.ping);
        assert!(completed.run.has_simulated_values());
        assert_eq!(completed.statistics.simulated_ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direction_selection_limits_windows() {
        let config =
            RunConfig { direction: TestDirection::Upload, ..RunConfig::default() };
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), config);

        orchestrator.start().await.unwrap();
        assert!(orchestrator
            .current_run()
            .unwrap()
            .window(Direction::Download)
            .is_none());

        sleep(Duration::from_millis(3000)).await;
        let record = orchestrator.tick().await.unwrap();
        orchestrator.stop().await.unwrap();

        assert_eq!(record.download_mbps, None);
        assert_eq!(record.upload_mbps, Some(20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        orchestrator.start().await.unwrap();
        let error = orchestrator.start().await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Config);

        // The active run is untouched.
        assert_eq!(orchestrator.current_run().unwrap().records.len(), 1);
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (mut orchestrator, progress) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        assert!(orchestrator.stop().await.is_none());
        assert_eq!(orchestrator.phase(), RunPhase::Idle);

        orchestrator.start().await.unwrap();
        assert!(orchestrator.stop().await.is_some());
        assert!(orchestrator.stop().await.is_none());

        let finished = progress
            .events()
            .iter()
            .filter(|event| matches!(event, ProgressEvent::Finished(_)))
            .count();
        assert_eq!(finished, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_creates_a_fresh_run() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        orchestrator.start().await.unwrap();
        sleep(Duration::from_millis(3000)).await;
        orchestrator.tick().await.unwrap();
        orchestrator.stop().await.unwrap();

        orchestrator.start().await.unwrap();
        let run = orchestrator.current_run().unwrap();
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.records[0].download_mbps, None);
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_without_run_fails() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());
        assert_eq!(
            orchestrator.tick().await.unwrap_err().kind,
            ErrorKind::Config
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poisoned_window_is_reported_and_recorded_absent() {
        let (mut orchestrator, progress) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        orchestrator.start().await.unwrap();
        sleep(Duration::from_millis(3000)).await;

        let window = Arc::clone(
            orchestrator.current_run().unwrap().window(Direction::Download).unwrap(),
        );
        let _ = std::thread::spawn(move || {
            let _guard = window.lock().unwrap();
            panic!("poison the window");
        })
        .join();

        let record = orchestrator.tick().await.unwrap();
        assert_eq!(record.download_mbps, None);
        assert_eq!(record.upload_mbps, Some(20.0));
        assert_eq!(orchestrator.current_run().unwrap().records.len(), 2);

        assert!(progress
            .events()
            .iter()
            .any(|event| matches!(event, ProgressEvent::Error(_))));
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sampling_interval_validates() {
        let (mut orchestrator, progress) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());

        assert!(orchestrator.set_sampling_interval(500).is_err());
        assert!(orchestrator.set_sampling_interval(6000).is_err());
        assert_eq!(
            orchestrator.config().sampling_interval,
            Duration::from_millis(3000)
        );

        assert_eq!(
            orchestrator.set_sampling_interval(2000).unwrap(),
            Duration::from_millis(2000)
        );
        assert!(progress
            .events()
            .iter()
            .any(|event| matches!(event, ProgressEvent::IntervalChanged(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_at_duration() {
        let config = RunConfig {
            duration: Duration::from_secs(10),
            ..RunConfig::default()
        };
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), config);
        let (_commands, receiver) = mpsc::channel(4);

        let completed = orchestrator.run(receiver).await.unwrap();

        // Samples at 0, 3, 6 and 9 seconds.
        assert_eq!(completed.run.records.len(), 4);
        assert!(!completed.run.is_continuous());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_commands_close() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());
        let (commands, receiver) = mpsc::channel(4);
        drop(commands);

        let completed = orchestrator.run(receiver).await.unwrap();

        assert_eq!(completed.run.records.len(), 1);
        assert_eq!(orchestrator.phase(), RunPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_command() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());
        let (commands, receiver) = mpsc::channel(4);

        tokio::spawn(async move {
            sleep(Duration::from_millis(7000)).await;
            let _ = commands.send(Command::Stop).await;
        });

        let completed = orchestrator.run(receiver).await.unwrap();

        // Samples at 0, 3 and 6 seconds.
        assert_eq!(completed.run.records.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_takes_effect_mid_run() {
        let (mut orchestrator, _) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());
        let (commands, receiver) = mpsc::channel(4);

        tokio::spawn(async move {
            sleep(Duration::from_millis(3500)).await;
            let _ = commands.send(Command::SetInterval(1000)).await;
            sleep(Duration::from_millis(3300)).await;
            let _ = commands.send(Command::Stop).await;
        });

        let completed = orchestrator.run(receiver).await.unwrap();

        // Samples at 0 and 3s, then every second from 4.5s until 6.8s.
        let times: Vec<f64> = completed
            .run
            .records
            .iter()
            .map(|record| (record.relative_time_sec * 10.0).round() / 10.0)
            .collect();
        assert_eq!(times, vec![0.0, 3.0, 4.5, 5.5, 6.5]);
        assert_eq!(completed.run.sampling_interval, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_interval_command_keeps_running() {
        let (mut orchestrator, progress) =
            orchestrator(AlternatingExecutor::default(), RunConfig::default());
        let (commands, receiver) = mpsc::channel(4);

        tokio::spawn(async move {
            let _ = commands.send(Command::SetInterval(100)).await;
            sleep(Duration::from_millis(4000)).await;
            let _ = commands.send(Command::Stop).await;
        });

        let completed = orchestrator.run(receiver).await.unwrap();

        assert_eq!(completed.run.records.len(), 2);
        assert_eq!(completed.run.sampling_interval, Duration::from_millis(3000));
        assert!(progress
            .events()
            .iter()
            .any(|event| matches!(event, ProgressEvent::Error(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_steady_link_keeps_its_reading() {
        // At 20 Mbps the 25 and 50 MiB probes take 10 to 21 seconds, far
        // longer than the window horizon.
        let config = RunConfig {
            direction: TestDirection::Download,
            duration: Duration::from_secs(299),
            ..RunConfig::default()
        };
        let (mut orchestrator, _) =
            orchestrator(SteadyExecutor { mbps: 20.0 }, config);
        let (_commands, receiver) = mpsc::channel(4);

        let completed = orchestrator.run(receiver).await.unwrap();
        let records = &completed.run.records;

        assert_eq!(records.len(), 100);
        assert_eq!(records[0].download_mbps, None);
        for record in &records[1..] {
            let mbps = record.download_mbps.unwrap_or_else(|| {
                panic!("no reading at {:.1}s", record.relative_time_sec)
            });
            assert!((mbps - 20.0).abs() < 1e-3, "read {} Mbps", mbps);
        }

        let report = completed.probes.download.unwrap();
        assert_eq!(report.size_bytes, 50 * crate::config::MIB);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_run_ends_on_the_run_clock() {
        let progress = Arc::new(RecordingProgress::default());
        let mut orchestrator = Orchestrator::new(
            AlternatingExecutor::default(),
            SlowPing(Duration::from_secs(1)),
            RunConfig { duration: Duration::from_secs(10), ..RunConfig::default() },
            progress as Arc<dyn ProgressCallback>,
        );
        let (_commands, receiver) = mpsc::channel(4);

        let began = Instant::now();
        let completed = orchestrator.run(receiver).await.unwrap();

        // Slow pings do not shift the sampling grid or the deadline.
        let times: Vec<f64> = completed
            .run
            .records
            .iter()
            .map(|record| (record.relative_time_sec * 10.0).round() / 10.0)
            .collect();
        assert_eq!(times, vec![0.0, 3.0, 6.0, 9.0]);
        assert!(began.elapsed() < Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_direction_decays_after_stale_limit() {
        let config = RunConfig {
            direction: TestDirection::Download,
            ..RunConfig::default()
        };
        let (mut orchestrator, _) =
            orchestrator(StallingExecutor::default(), config);

        orchestrator.start().await.unwrap();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(orchestrator.tick().await.unwrap().download_mbps, Some(40.0));

        // The only sample settled at 1s; it is kept until 91s.
        sleep(Duration::from_secs(87)).await;
        assert_eq!(orchestrator.tick().await.unwrap().download_mbps, Some(40.0));

        sleep(Duration::from_secs(3)).await;
        assert_eq!(orchestrator.tick().await.unwrap().download_mbps, None);
        orchestrator.stop().await.unwrap();
    }
}
