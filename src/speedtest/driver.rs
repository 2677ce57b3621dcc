//! Continuous probe scheduling.
//!
//! One driver task owns the in-flight probe sets and size progressions of
//! every measured direction. It keeps `target_concurrency` probes in
//! flight per direction, topping up on a fixed cadence and whenever a
//! probe settles. Settled probes feed the shared sample windows that the
//! orchestrator reads on its own clock.

use crate::config::DriverConfig;
use crate::errors::{ErrorKind, SpeedTestError};
use crate::measurements::{Sample, SampleWindow};
use crate::speedtest::{Direction, ProbeExecutor, ProbeMeasurement};
use futures::FutureExt;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Sample window shared between a driver and the orchestrator.
pub type SharedWindow = Arc<Mutex<SampleWindow>>;

/// Identifier of one launched probe, unique within a driver.
pub type ProbeId = u64;

/// Range synthetic download values are drawn from, in Mbps.
pub const SIMULATED_DOWNLOAD_RANGE_MBPS: Range<f64> = 10.0..100.0;

/// Range synthetic upload values are drawn from, in Mbps.
pub const SIMULATED_UPLOAD_RANGE_MBPS: Range<f64> = 5.0..50.0;

/// Draw a synthetic throughput value for a direction.
pub fn simulated_mbps(direction: Direction) -> f64 {
    let range = match direction {
        Direction::Download => SIMULATED_DOWNLOAD_RANGE_MBPS,
        Direction::Upload => SIMULATED_UPLOAD_RANGE_MBPS,
    };
    rand::rng().random_range(range)
}

/// Ordered list of probe sizes with a cursor that only moves forward.
#[derive(Debug, Clone)]
pub struct SizeProgression {
    sizes: Vec<u64>,
    index: usize,
}

impl SizeProgression {
    pub fn new(sizes: Vec<u64>) -> Self {
        Self { sizes, index: 0 }
    }

    /// Size of the next probe to launch.
    pub fn current(&self) -> u64 {
        self.sizes.get(self.index).copied().unwrap_or(0)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Step to the next size, staying on the last one once reached.
    pub fn advance(&mut self) {
        if self.index + 1 < self.sizes.len() {
            self.index += 1;
        }
    }
}

/// Probes currently in flight for one direction.
#[derive(Debug, Default)]
pub struct ActiveProbeSet {
    ids: HashSet<ProbeId>,
}

impl ActiveProbeSet {
    pub fn insert(&mut self, id: ProbeId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: ProbeId) -> bool {
        self.ids.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Probes missing to reach `target`.
    pub fn deficit(&self, target: usize) -> usize {
        target.saturating_sub(self.ids.len())
    }
}

/// Probe counters of one direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectionReport {
    pub launched: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failures that produced a synthetic sample
    pub simulated: u64,
    /// Highest number of probes that were in flight at once
    pub peak_in_flight: usize,
    /// Final position in the size progression
    pub size_index: usize,
    pub size_bytes: u64,
}

/// Final state of a driver after it stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverReport {
    pub download: Option<DirectionReport>,
    pub upload: Option<DirectionReport>,
}

impl DriverReport {
    pub fn direction(&self, direction: Direction) -> Option<&DirectionReport> {
        match direction {
            Direction::Download => self.download.as_ref(),
            Direction::Upload => self.upload.as_ref(),
        }
    }
}

struct Lane {
    direction: Direction,
    active: ActiveProbeSet,
    progression: SizeProgression,
    window: SharedWindow,
    report: DirectionReport,
}

impl Lane {
    fn record(&self, sample: Sample) {
        match self.window.lock() {
            Ok(mut window) => window.insert(sample),
            Err(_) => error!(
                "{} window lock poisoned, dropping sample of {:.2} Mbps",
                self.direction, sample.value_mbps
            ),
        }
    }
}

struct Settlement {
    direction: Direction,
    id: ProbeId,
    bytes: u64,
    outcome: Result<ProbeMeasurement, SpeedTestError>,
}

/// Continuous test driver for one run.
pub struct ContinuousDriver<P> {
    executor: Arc<P>,
    config: DriverConfig,
    lanes: Vec<Lane>,
    in_flight: JoinSet<Settlement>,
    next_id: ProbeId,
    clock: Instant,
}

impl<P: ProbeExecutor> ContinuousDriver<P> {
    /// Create a driver for the given directions.
    ///
    /// `clock` is the run's monotonic origin; sample timestamps are
    /// milliseconds since it.
    pub fn new(
        executor: Arc<P>,
        config: DriverConfig,
        windows: Vec<(Direction, SharedWindow)>,
        clock: Instant,
    ) -> Self {
        let lanes = windows
            .into_iter()
            .map(|(direction, window)| Lane {
                direction,
                active: ActiveProbeSet::default(),
                progression: SizeProgression::new(
                    config.sizes(direction).to_vec(),
                ),
                window,
                report: DirectionReport::default(),
            })
            .collect();

        Self {
            executor,
            config,
            lanes,
            in_flight: JoinSet::new(),
            next_id: 0,
            clock,
        }
    }

    /// Spawn the driver loop onto the runtime.
    pub fn spawn(self) -> DriverHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));

        DriverHandle { stop_tx, task: Some(task) }
    }

    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> DriverReport {
        info!(
            "Driver started for {} direction(s), {} probes each",
            self.lanes.len(),
            self.config.target_concurrency
        );

        self.fill();

        let cadence = self.config.schedule_interval;
        let mut schedule = interval_at(Instant::now() + cadence, cadence);
        schedule.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok(settlement) => self.settle(settlement),
                        Err(e) => error!("Probe task failed to join: {}", e),
                    }
                    self.fill();
                }
                _ = schedule.tick() => self.fill(),
            }
        }

        // Probes still in flight run to completion on their own; nothing
        // collects their results any more.
        let abandoned = self.in_flight.len();
        self.in_flight.detach_all();
        info!("Driver stopped, {} probe(s) abandoned", abandoned);

        self.report()
    }

    /// Launch as many probes as each direction is short of its target.
    fn fill(&mut self) {
        for lane in 0..self.lanes.len() {
            let deficit =
                self.lanes[lane].active.deficit(self.config.target_concurrency);
            for _ in 0..deficit {
                self.launch(lane);
            }
        }
    }

    fn launch(&mut self, lane: usize) {
        let id = self.next_id;
        self.next_id += 1;

        let lane = &mut self.lanes[lane];
        lane.active.insert(id);
        lane.report.launched += 1;
        lane.report.peak_in_flight =
            lane.report.peak_in_flight.max(lane.active.len());

        let direction = lane.direction;
        let bytes = lane.progression.current();
        let executor = Arc::clone(&self.executor);

        debug!("Launching {} probe #{} ({} bytes)", direction, id, bytes);

        self.in_flight.spawn(async move {
            let outcome = AssertUnwindSafe(executor.run_probe(direction, bytes))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(SpeedTestError::critical(format!(
                        "{} probe #{} panicked",
                        direction, id
                    )))
                });

            Settlement { direction, id, bytes, outcome }
        });
    }

    fn settle(&mut self, settlement: Settlement) {
        let now_ms = self.clock.elapsed().as_secs_f64() * 1000.0;
        let simulate = self.config.simulate_on_exhaustion;

        let Some(lane) = self
            .lanes
            .iter_mut()
            .find(|lane| lane.direction == settlement.direction)
        else {
            return;
        };

        if !lane.active.remove(settlement.id) {
            warn!(
                "{} probe #{} settled but was not active",
                settlement.direction, settlement.id
            );
            return;
        }

        match settlement.outcome {
            Ok(measurement) => {
                let mbps = measurement.mbps();
                debug!(
                    "{} probe #{} settled: {} bytes at {:.2} Mbps",
                    lane.direction, settlement.id, settlement.bytes, mbps
                );
                lane.record(Sample::measured(
                    mbps,
                    now_ms,
                    measurement.elapsed_ms(),
                ));
                lane.report.succeeded += 1;
                lane.progression.advance();
            }
            Err(error) if error.kind == ErrorKind::Exhausted && simulate => {
                let mbps = simulated_mbps(lane.direction);
                warn!(
                    "{} probe #{} exhausted all endpoints, recording synthetic {:.2} Mbps",
                    lane.direction, settlement.id, mbps
                );
                lane.record(Sample::simulated(mbps, now_ms));
                lane.report.failed += 1;
                lane.report.simulated += 1;
            }
            Err(error) => {
                debug!(
                    "{} probe #{} failed: {}",
                    lane.direction, settlement.id, error.message
                );
                lane.report.failed += 1;
            }
        }
    }

    fn report(&self) -> DriverReport {
        let mut report = DriverReport::default();

        for lane in &self.lanes {
            let mut direction = lane.report.clone();
            direction.size_index = lane.progression.index();
            direction.size_bytes = lane.progression.current();

            match lane.direction {
                Direction::Download => report.download = Some(direction),
                Direction::Upload => report.upload = Some(direction),
            }
        }

        report
    }
}

/// Handle to a spawned driver.
#[derive(Debug)]
pub struct DriverHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<DriverReport>>,
}

impl DriverHandle {
    /// Ask the driver to stop. Calling this more than once is harmless.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    #[cfg(test)]
    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Stop the driver and wait for its final report.
    pub async fn join(mut self) -> Result<DriverReport, SpeedTestError> {
        self.stop();

        match self.task.take() {
            Some(task) => task.await.map_err(|e| {
                SpeedTestError::critical(format!("driver task failed: {}", e))
            }),
            None => Ok(DriverReport::default()),
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
