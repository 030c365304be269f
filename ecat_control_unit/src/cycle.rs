//! Cyclic control task: lock → read → supervise → gate → write → sleep.
//!
//! ## RT setup
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` when `rt.lock_memory`.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` when `rt.cpu_core` is set.
//! 4. `sched_setscheduler(SCHED_FIFO, rt.priority)`.
//!
//! ## Cycle body
//! The semaphore is taken with `sem_trywait`; a busy semaphore skips the whole
//! cycle. Otherwise it is held across read, supervision and write-back, so the
//! master's status words are never overwritten by a stale copy. Nothing is
//! logged while it is held; state changes are collected and logged after
//! `sem_post`.
//!
//! ## Pacing
//! [`PacingMode::FixedSleep`] sleeps one full period after the work.
//! [`PacingMode::AbsoluteDeadline`] sleeps on `CLOCK_MONOTONIC` with
//! `TIMER_ABSTIME`, advancing the deadline by exactly one period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ecat_common::consts::{CSV_OPERATION_MODE, DRIVE_COUNT};
use ecat_common::drive::{ControlWord, DriveRecords, Wheel};
use ecat_common::motion::VelocityCommand;
use ecat_shared_memory::{SharedMemoryChannel, ShmError};
use nix::sys::time::TimeSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::command::{CommandExchange, CommandLimits};
use crate::config::{DriveUnitConfig, RtConfig};
use crate::kinematics::{DifferentialDrive, Kinematics};
use crate::state::{DriveEvaluation, DrivePolicy, DriveSupervisorState};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Stack bytes touched before entering the loop.
const PREFAULT_STACK_BYTES: usize = 512 * 1024;

/// Periods `disable_drives` waits for the master to release the semaphore.
const DISABLE_LOCK_PERIODS: u32 = 10;

// ─── Pacing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    /// Sleep a full period after each cycle; the period stretches under load.
    #[default]
    FixedSleep,
    /// Drift-free absolute deadlines on `CLOCK_MONOTONIC`.
    AbsoluteDeadline,
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle counters and timing, no allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed, skipped ones included.
    pub cycle_count: u64,
    /// Cycles skipped because the master held the semaphore.
    pub lock_misses: u64,
    /// Cycles where the segment could not be read.
    pub invalid_segments: u64,
    /// Cycles whose work exceeded the period.
    pub overruns: u64,
    /// Times the absolute deadline was pulled forward to now.
    pub resyncs: u64,
    pub last_cycle_ns: i64,
    pub min_cycle_ns: i64,
    pub max_cycle_ns: i64,
    pub sum_cycle_ns: i64,
    /// Largest wake-up delay past the deadline [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            lock_misses: 0,
            invalid_segments: 0,
            overruns: 0,
            resyncs: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record one cycle's work duration and wake-up latency.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average work duration [ns] (0 before the first cycle).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }

    pub fn log_summary(&self) {
        let min_ns = if self.cycle_count == 0 { 0 } else { self.min_cycle_ns };
        info!(
            cycles = self.cycle_count,
            lock_misses = self.lock_misses,
            invalid_segments = self.invalid_segments,
            overruns = self.overruns,
            resyncs = self.resyncs,
            min_ns,
            max_ns = self.max_cycle_ns,
            avg_ns = self.avg_cycle_ns(),
            max_latency_ns = self.max_latency_ns,
            "Cycle statistics"
        );
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RtError {
    #[error("mlockall failed: {0}")]
    MemoryLock(#[source] nix::Error),

    #[error("CPU core {cpu} not usable: {source}")]
    InvalidCpu {
        cpu: usize,
        #[source]
        source: nix::Error,
    },

    #[error("sched_setaffinity failed: {0}")]
    Affinity(#[source] nix::Error),

    #[error("sched_setscheduler(SCHED_FIFO, {priority}) failed: {source}")]
    Scheduler {
        priority: i32,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("shared memory: {0}")]
    Shm(#[from] ShmError),

    #[error("shared memory segment is not readable")]
    InvalidSegment,

    #[error("semaphore not released by the master within {timeout:?}")]
    LockTimeout { timeout: Duration },

    #[error("clock error: {0}")]
    Clock(#[source] nix::Error),
}

// ─── RT Setup ───────────────────────────────────────────────────────

fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE).map_err(RtError::MemoryLock)
}

/// Touch stack pages so the loop does not fault them in later.
fn prefault_stack() {
    let mut buf = [0u8; PREFAULT_STACK_BYTES];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid exclusive reference.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

fn rt_set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|source| RtError::InvalidCpu { cpu, source })?;
    sched_setaffinity(Pid::from_raw(0), &cpuset).map_err(RtError::Affinity)
}

fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtError::Scheduler {
            priority,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Apply the RT configuration to the calling thread.
///
/// Call on the control thread after every helper thread has been spawned, so
/// helpers keep ordinary scheduling.
pub fn rt_setup(config: &RtConfig) -> Result<(), RtError> {
    if !config.enabled {
        warn!("RT setup disabled, running with default scheduling");
        return Ok(());
    }
    if config.lock_memory {
        rt_mlockall()?;
    }
    prefault_stack();
    if let Some(cpu) = config.cpu_core {
        rt_set_affinity(cpu)?;
    }
    rt_set_scheduler(config.priority)?;
    info!(
        priority = config.priority,
        cpu_core = ?config.cpu_core,
        lock_memory = config.lock_memory,
        "RT setup complete"
    );
    Ok(())
}

// ─── Control Loop ───────────────────────────────────────────────────

/// Result of one [`ControlLoop::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Semaphore held by the master; nothing was read or written.
    LockBusy,
    /// Semaphore taken but the segment could not be read.
    InvalidSegment,
    /// Records written back. `operational` is the aggregate drive gate.
    Completed { operational: bool },
}

/// One drive's state change in a cycle.
#[derive(Debug, Clone, Copy)]
struct StateChange {
    wheel: Wheel,
    evaluation: DriveEvaluation,
    status_word: u16,
    control_word: u16,
}

/// What the locked part of a cycle observed, logged once the lock is released.
#[derive(Debug, Clone, Copy)]
struct CycleReport {
    changes: [Option<StateChange>; DRIVE_COUNT],
    gate_changed: bool,
    operational: bool,
}

impl CycleReport {
    fn log(&self) {
        for change in self.changes.iter().flatten() {
            info!(
                wheel = change.wheel.name(),
                from = %change.evaluation.previous_state,
                to = %change.evaluation.state,
                "Drive state changed (status {:#06x}, control {:#06x})",
                change.status_word,
                change.control_word
            );
        }
        if self.gate_changed {
            info!(operational = self.operational, "Drive gate changed");
        }
    }
}

/// Everything the cycle body mutates besides the channel.
struct LoopCore<K> {
    drives: [DriveSupervisorState; DRIVE_COUNT],
    policy: DrivePolicy,
    kinematics: K,
    limits: Option<CommandLimits>,
    /// Last command passed to the drives after limiting.
    dispatched: VelocityCommand,
    exchange: Arc<CommandExchange>,
    operational: bool,
    dt: f64,
    stats: CycleStats,
}

impl<K: Kinematics> LoopCore<K> {
    /// Supervise both drives and fill in targets. Runs under the semaphore, so
    /// it only copies and computes.
    fn process(&mut self, records: &mut DriveRecords, timestamp: f64) -> CycleReport {
        let mut changes = [None; DRIVE_COUNT];
        for wheel in Wheel::ALL {
            let record = &mut records[wheel.index()];
            record.operation_mode = CSV_OPERATION_MODE;

            let evaluation = self.drives[wheel.index()].evaluate(record.status_word, &self.policy);
            // An enabled drive keeps the control word already in the segment.
            if !evaluation.state.is_operational() {
                record.control_word = evaluation.control_word;
            }
            if evaluation.state_changed() {
                changes[wheel.index()] = Some(StateChange {
                    wheel,
                    evaluation,
                    status_word: record.status_word,
                    control_word: record.control_word,
                });
            }
        }

        let operational = self.drives.iter().all(|d| d.is_operational);
        let gate_changed = operational != self.operational;
        self.operational = operational;

        let command = self.shape_command(self.exchange.read_command(), operational);
        if operational {
            let wheels = self.kinematics.wheel_velocities(command);
            for wheel in Wheel::ALL {
                records[wheel.index()].target_velocity =
                    self.kinematics.motor_velocity(wheel, wheels.get(wheel));
            }
        } else {
            for record in records.iter_mut() {
                record.target_velocity = 0;
            }
        }

        let right = self
            .kinematics
            .wheel_velocity(Wheel::Right, records[Wheel::Right.index()].current_velocity);
        let left = self
            .kinematics
            .wheel_velocity(Wheel::Left, records[Wheel::Left.index()].current_velocity);
        let odometry = self.kinematics.update_odometry(right, left, timestamp);
        self.exchange.publish_odometry(odometry);

        CycleReport {
            changes,
            gate_changed,
            operational,
        }
    }

    /// Apply the optional limiter. A closed gate resets it to standstill.
    fn shape_command(&mut self, requested: VelocityCommand, operational: bool) -> VelocityCommand {
        let Some(limits) = &self.limits else {
            return requested;
        };
        self.dispatched = if operational {
            limits.apply(self.dispatched, requested, self.dt)
        } else {
            VelocityCommand::ZERO
        };
        self.dispatched
    }
}

/// Owns the channel and all per-drive state for the cycle task.
pub struct ControlLoop<K: Kinematics = DifferentialDrive> {
    channel: SharedMemoryChannel,
    core: LoopCore<K>,
    period: Duration,
    pacing: PacingMode,
}

impl<K: Kinematics> ControlLoop<K> {
    pub fn new(
        channel: SharedMemoryChannel,
        kinematics: K,
        exchange: Arc<CommandExchange>,
        config: &DriveUnitConfig,
    ) -> Self {
        let period = config.cycle.period();
        Self {
            channel,
            core: LoopCore {
                drives: [DriveSupervisorState::new(); DRIVE_COUNT],
                policy: config.drive,
                kinematics,
                limits: config.limiter,
                dispatched: VelocityCommand::ZERO,
                exchange,
                operational: false,
                dt: period.as_secs_f64(),
                stats: CycleStats::new(),
            },
            period,
            pacing: config.cycle.pacing,
        }
    }

    pub fn stats(&self) -> &CycleStats {
        &self.core.stats
    }

    pub fn drives(&self) -> &[DriveSupervisorState; DRIVE_COUNT] {
        &self.core.drives
    }

    /// Run one cycle body without pacing or statistics.
    ///
    /// # Errors
    /// OS-level semaphore failures and write size mismatches. Contention is
    /// not an error.
    pub fn step(&mut self, timestamp: f64) -> Result<CycleOutcome, CycleError> {
        let Some(mut guard) = self.channel.try_lock()? else {
            self.core.stats.lock_misses += 1;
            trace!("semaphore busy, cycle skipped");
            return Ok(CycleOutcome::LockBusy);
        };

        let Some(mut records) = guard.read() else {
            guard.unlock()?;
            self.core.stats.invalid_segments += 1;
            debug!("segment unreadable, cycle skipped");
            return Ok(CycleOutcome::InvalidSegment);
        };

        let report = self.core.process(&mut records, timestamp);
        guard.write(&records)?;
        guard.unlock()?;

        report.log();
        Ok(CycleOutcome::Completed {
            operational: report.operational,
        })
    }

    /// Cycle until `shutdown` is set. The flag is polled at the top of every cycle.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), CycleError> {
        info!(
            period_us = self.period.as_micros() as u64,
            pacing = ?self.pacing,
            "Entering control loop"
        );
        let result = match self.pacing {
            PacingMode::FixedSleep => self.run_fixed_sleep(shutdown),
            PacingMode::AbsoluteDeadline => self.run_absolute_deadline(shutdown),
        };
        info!("Control loop stopped");
        result
    }

    fn run_fixed_sleep(&mut self, shutdown: &AtomicBool) -> Result<(), CycleError> {
        let period_ns = duration_ns(self.period);
        while !shutdown.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            self.step(wall_clock_seconds())?;
            let elapsed = duration_ns(cycle_start.elapsed());
            self.finish_cycle(elapsed, 0, period_ns);

            std::thread::sleep(self.period);
        }
        Ok(())
    }

    fn run_absolute_deadline(&mut self, shutdown: &AtomicBool) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = duration_ns(self.period);
        let mut next_wake = clock_gettime(clock).map_err(CycleError::Clock)?;

        while !shutdown.load(Ordering::Acquire) {
            let cycle_start = clock_gettime(clock).map_err(CycleError::Clock)?;
            let latency_ns = timespec_diff_ns(&cycle_start, &next_wake).max(0);

            self.step(wall_clock_seconds())?;

            let cycle_end = clock_gettime(clock).map_err(CycleError::Clock)?;
            self.finish_cycle(
                timespec_diff_ns(&cycle_end, &cycle_start),
                latency_ns,
                period_ns,
            );

            next_wake = timespec_add_ns(next_wake, period_ns);
            if timespec_diff_ns(&cycle_end, &next_wake) > period_ns {
                self.core.stats.resyncs += 1;
                debug!("more than one period behind, deadline resynchronised");
                next_wake = cycle_end;
            }

            loop {
                match clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake) {
                    Ok(_) => break,
                    Err(nix::errno::Errno::EINTR) => continue,
                    Err(e) => return Err(CycleError::Clock(e)),
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn finish_cycle(&mut self, duration_ns: i64, latency_ns: i64, period_ns: i64) {
        self.core.stats.record(duration_ns, latency_ns);
        if duration_ns > period_ns {
            self.core.stats.overruns += 1;
            debug!(duration_ns, period_ns, "cycle overrun");
        }
    }

    /// Send the CiA 402 shutdown command with zero targets to both drives.
    ///
    /// Waits at most a few periods for the semaphore; only used after the loop
    /// has stopped.
    pub fn disable_drives(&mut self) -> Result<(), CycleError> {
        let timeout = self.period * DISABLE_LOCK_PERIODS;
        let Some(mut guard) = self.channel.lock_timeout(timeout)? else {
            return Err(CycleError::LockTimeout { timeout });
        };
        let mut records = guard.read().ok_or(CycleError::InvalidSegment)?;
        for record in records.iter_mut() {
            record.control_word = ControlWord::SHUTDOWN.bits();
            record.target_velocity = 0;
        }
        guard.write(&records)?;
        guard.unlock()?;
        info!("Drives commanded to shutdown state");
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn duration_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn timespec_add_ns(ts: TimeSpec, ns: i64) -> TimeSpec {
    let total = ts.tv_nsec() as i64 + ns;
    let secs = ts.tv_sec() as i64 + total.div_euclid(NANOS_PER_SEC);
    let nanos = total.rem_euclid(NANOS_PER_SEC);
    TimeSpec::new(secs as _, nanos as _)
}

/// `a - b` in nanoseconds.
fn timespec_diff_ns(a: &TimeSpec, b: &TimeSpec) -> i64 {
    (a.tv_sec() as i64 - b.tv_sec() as i64) * NANOS_PER_SEC
        + (a.tv_nsec() as i64 - b.tv_nsec() as i64)
}
