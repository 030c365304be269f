//! ECAT Common Library
//!
//! Shared definitions for the differential-drive EtherCAT supervisor.
//! Everything that must agree bit-for-bit with the external EtherCAT master
//! process lives here, together with the configuration loading layer.
//!
//! # Module Structure
//!
//! - [`consts`] - Slot count, CSV mode value, default object names, cycle period
//! - [`drive`] - `DriveRecord` process-data layout and CiA 402 word flags
//! - [`motion`] - Velocity command and odometry value types
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecat_common::drive::{DriveRecord, Wheel};
//! use ecat_common::consts::DRIVE_COUNT;
//!
//! let records = [DriveRecord::default(); DRIVE_COUNT];
//! assert_eq!(records[Wheel::Right.index()].status_word, 0);
//! ```

pub mod config;
pub mod consts;
pub mod drive;
pub mod motion;
pub mod prelude;
