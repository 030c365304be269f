//! # ECAT Control Unit Library
//!
//! CiA 402 supervisor for the two wheel drives of a differential-drive robot.
//! An external EtherCAT master owns the fieldbus and mirrors the drives'
//! process data into a POSIX shared memory segment; this crate runs the
//! fixed-period loop that reads that mirror, walks each drive towards
//! OPERATION_ENABLED, gates actuation, and writes targets back.
//!
//! ## Data flow
//!
//! ```text
//! comm thread ──▶ CommandExchange ──▶ ControlLoop ──▶ SharedMemoryChannel ──▶ master
//! comm thread ◀── CommandExchange ◀── ControlLoop ◀── SharedMemoryChannel ◀── master
//! ```
//!
//! ## Safety gate
//!
//! Nonzero `target_velocity` is written only while both drives report
//! OPERATION_ENABLED. Any other state, including an unrecognised status word,
//! zeroes both targets in the same cycle.

pub mod comm;
pub mod command;
pub mod config;
pub mod cycle;
pub mod kinematics;
pub mod state;
