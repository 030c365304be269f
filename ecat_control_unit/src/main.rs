//! # ECAT Control Unit
//!
//! Attaches to the EtherCAT master's shared memory segment, starts the
//! communication thread, raises the control thread to SCHED_FIFO and runs the
//! fixed-period CiA 402 supervision loop until SIGINT/SIGTERM.
//!
//! Exit codes: 0 clean shutdown, 1 runtime failure, 2 configuration error,
//! 10 shared memory / semaphore initialisation failure, 11 RT setup failure.

use clap::Parser;
use ecat_common::config::{ConfigError, LogLevel};
use ecat_control_unit::comm::{CommError, UdpJsonLink, spawn_comm_thread};
use ecat_control_unit::command::CommandExchange;
use ecat_control_unit::config::{DriveUnitConfig, ShmMode, load_config};
use ecat_control_unit::cycle::{ControlLoop, CycleError, RtError, rt_setup};
use ecat_control_unit::kinematics::DifferentialDrive;
use ecat_shared_memory::{SharedMemoryChannel, ShmError};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// ECAT Control Unit: CiA 402 wheel drive supervisor
#[derive(Parser, Debug)]
#[command(name = "ecat_control_unit")]
#[command(version)]
#[command(about = "Fixed-period CiA 402 supervisor for two EtherCAT wheel drives")]
struct Args {
    /// Path to the TOML configuration (built-in defaults when omitted).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Create the shared memory segment and semaphore if missing.
    #[arg(long)]
    create: bool,

    /// SCHED_FIFO priority (overrides `rt.priority`).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// CPU core to pin the control thread to (overrides `rt.cpu_core`).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("shared memory init: {0}")]
    Shm(#[from] ShmError),

    #[error("RT setup: {0}")]
    Rt(#[from] RtError),

    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("communication: {0}")]
    Comm(#[from] CommError),

    #[error("failed to spawn communication thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("control loop: {0}")]
    Cycle(#[from] CycleError),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Shm(e) if e.is_init_failure() => 10,
            Self::Rt(_) => 11,
            _ => 1,
        }
    }
}

fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    info!("ECAT Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(AppError::from)
        .and_then(|config| run(&args, config));

    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(e.exit_code());
    }

    info!("ECAT Control Unit shutdown complete");
}

fn run(args: &Args, mut config: DriveUnitConfig) -> Result<(), AppError> {
    apply_overrides(args, &mut config);
    config.validate()?;
    info!(
        service = %config.shared.service_name,
        period_us = config.cycle.period_us,
        pacing = ?config.cycle.pacing,
        fault_reset_override = config.drive.fault_reset_override,
        limiter = config.limiter.is_some(),
        "Config OK"
    );

    let channel = SharedMemoryChannel::init(
        &config.shm.segment_name,
        &config.shm.semaphore_name,
        config.shm.mode.into(),
    )?;

    // The handler only flips the flag.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::Release))?;

    let exchange = Arc::new(CommandExchange::new());
    let comm_shutdown = Arc::new(AtomicBool::new(false));
    let link = UdpJsonLink::bind(&config.comm)?;
    let comm = spawn_comm_thread(
        link,
        Arc::clone(&exchange),
        Arc::clone(&comm_shutdown),
        config.comm.poll_interval(),
    )
    .map_err(AppError::Spawn)?;

    if let Err(e) = rt_setup(&config.rt) {
        comm_shutdown.store(true, Ordering::Release);
        let _ = comm.join();
        return Err(e.into());
    }

    let kinematics = DifferentialDrive::new(config.kinematics);
    let mut control = ControlLoop::new(channel, kinematics, exchange, &config);
    let result = control.run(&shutdown);
    info!("Shutdown requested, stopping communication thread");

    comm_shutdown.store(true, Ordering::Release);
    if comm.join().is_err() {
        warn!("Communication thread panicked");
    }

    if config.shutdown.disable_drives {
        if let Err(e) = control.disable_drives() {
            error!("Failed to disable drives: {e}");
        }
    }

    control.stats().log_summary();
    result.map_err(AppError::from)
}

fn apply_overrides(args: &Args, config: &mut DriveUnitConfig) {
    if args.create {
        config.shm.mode = ShmMode::Create;
    }
    if let Some(priority) = args.rt_priority {
        config.rt.priority = priority;
    }
    if args.cpu_core.is_some() {
        config.rt.cpu_core = args.cpu_core;
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
///
/// `RUST_LOG` takes precedence over both.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
