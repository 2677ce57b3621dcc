extern crate clap;

mod config;
mod errors;
mod export;
mod fallback;
mod measurements;
mod results;
mod speedtest;
mod stats;
mod tui;

use crate::config::{
    sampling_interval, DriverConfig, PingConfig, ProbeConfig, RunConfig,
    TestDirection,
};
use crate::errors::{exit_codes, format_error_for_display, SpeedTestError};
use crate::results::RunResults;
use crate::speedtest::engine::{Command, CompletedRun, Orchestrator};
use crate::speedtest::ping::PingSampler;
use crate::speedtest::probe::HttpProbeExecutor;
use crate::tui::{DisplayMode, TuiController};
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use colored::Colorize;
use log::{error, info, LevelFilter};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Dashboard refresh and key polling cadence.
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

static VERSION: LazyLock<String> =
    LazyLock::new(|| match option_env!("NETPULSE_BUILD_GIT_HASH") {
        Some(hash) => format!("{} (rev {})", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_string(),
    });

#[derive(Parser)]
#[command(author, version = VERSION.as_str(), about, long_about = None)]
struct Cli {
    /// Directions to measure
    #[arg(long, value_enum, default_value_t = TestDirection::Both)]
    direction: TestDirection,

    /// Run duration in seconds; 0 runs until stopped
    #[arg(long, default_value_t = 0)]
    duration: u64,

    /// Sampling interval in milliseconds
    #[arg(
        long,
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1000..=5000)
    )]
    interval: u64,

    /// Probes kept in flight per direction
    #[arg(
        long,
        default_value_t = 2,
        value_parser = clap::value_parser!(u64).range(1..=8)
    )]
    concurrency: u64,

    /// Directory the CSV export is written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Skip the CSV export
    #[arg(long)]
    no_export: bool,

    /// Leave a direction empty instead of inserting simulated samples when
    /// every endpoint fails
    #[arg(long)]
    no_simulate: bool,

    /// Print the results as JSON when the run ends
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    verbose: Verbosity,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig, SpeedTestError> {
        let config = RunConfig {
            direction: self.direction,
            duration: Duration::from_secs(self.duration),
            sampling_interval: sampling_interval(self.interval)?,
            driver: DriverConfig {
                target_concurrency: self.concurrency as usize,
                simulate_on_exhaustion: !self.no_simulate,
                ..DriverConfig::default()
            },
            ..RunConfig::default()
        };

        config.validate()?;
        Ok(config)
    }
}

/// Log output would tear the dashboard, so it is silenced there; errors
/// still reach the screen through progress events.
fn init_logging(level: LevelFilter, mode: DisplayMode) {
    let level = match mode {
        DisplayMode::Tui => LevelFilter::Off,
        _ => level,
    };

    env_logger::Builder::new().filter_level(level).init();
}

fn spawn_signal_handler(commands: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping run");
            let _ = commands.send(Command::Stop).await;
        }
    });
}

/// Keep the display fresh and forward key commands until the run task
/// finishes.
async fn drive_display(
    display: &mut TuiController,
    task: &mut JoinHandle<Result<CompletedRun, SpeedTestError>>,
    commands: &mpsc::Sender<Command>,
) -> Result<CompletedRun, SpeedTestError> {
    let mut refresh = tokio::time::interval(FRAME_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            joined = &mut *task => {
                return joined.map_err(|e| {
                    SpeedTestError::critical(format!("run task failed: {}", e))
                })?;
            }
            _ = refresh.tick() => {
                display.render()?;
                if let Some(command) = display.poll_command()? {
                    let _ = commands.send(command).await;
                }
            }
        }
    }
}

async fn run(cli: Cli, mode: DisplayMode) -> Result<i32, SpeedTestError> {
    let config = cli.run_config()?;
    let executor = HttpProbeExecutor::new(ProbeConfig::default())?;
    let ping = PingSampler::new(PingConfig::default())?;

    let mut display = TuiController::new(mode);
    let mut orchestrator = Orchestrator::new(
        executor,
        ping,
        config,
        display.progress_callback(),
    );

    let (commands, receiver) = mpsc::channel(8);
    spawn_signal_handler(commands.clone());

    display.init()?;
    let mut task =
        tokio::spawn(async move { orchestrator.run(receiver).await });

    let outcome = drive_display(&mut display, &mut task, &commands).await;
    if outcome.is_err() {
        let _ = commands.try_send(Command::Stop);
    }
    display.cleanup()?;
    let completed = outcome?;

    let mut export_error = None;
    let export_path = if cli.no_export {
        None
    } else {
        match export::write_csv(&completed, &cli.output_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("{}", e);
                export_error = Some(e);
                None
            }
        }
    };

    let results = RunResults::from_completed(&completed, export_path.as_deref());
    display.show_results(&results)?;

    if let Some(e) = export_error {
        return Err(e);
    }

    if completed.run.has_simulated_values() {
        return Ok(exit_codes::PARTIAL_FAILURE);
    }

    Ok(exit_codes::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = DisplayMode::detect(cli.json, io::stdout().is_terminal());
    init_logging(cli.verbose.log_level_filter(), mode);

    match run(cli, mode).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", format_error_for_display(&e).red());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
