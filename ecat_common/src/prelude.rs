//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecat_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CSV_OPERATION_MODE, CYCLE_PERIOD_US, DRIVE_COUNT};

// ─── Process Data ───────────────────────────────────────────────────
pub use crate::drive::{ControlWord, DriveRecord, DriveRecords, StatusWord, Wheel};
pub use crate::motion::{OdometryEstimate, VelocityCommand};
