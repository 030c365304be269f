//! System-wide constants for the drive supervisor.
//!
//! Single source of truth for the fixed process-data geometry and the
//! default names shared with the EtherCAT master process.

/// Number of drive slots in the shared segment (0 = right wheel, 1 = left wheel).
pub const DRIVE_COUNT: usize = 2;

/// CiA 402 "cyclic synchronous velocity" mode of operation.
pub const CSV_OPERATION_MODE: u8 = 0x09;

/// Default control cycle period in microseconds (2 ms).
pub const CYCLE_PERIOD_US: u32 = 2000;

/// Lower bound for a configured cycle period [µs].
pub const CYCLE_PERIOD_US_MIN: u32 = 100;

/// Upper bound for a configured cycle period [µs].
pub const CYCLE_PERIOD_US_MAX: u32 = 100_000;

/// Default POSIX shared memory object name (shared with the master).
pub const DEFAULT_SEGMENT_NAME: &str = "/ethercat_data";

/// Default POSIX named semaphore name (shared with the master).
pub const DEFAULT_SEMAPHORE_NAME: &str = "/ethercat_data_sem";

/// Default SCHED_FIFO priority of the control thread.
pub const DEFAULT_RT_PRIORITY: i32 = 60;
