//! Drive state machine root.
//!
//! CiA 402 classification/transition tables and the per-drive supervisor
//! that applies them once per cycle.

pub mod cia402;
pub mod supervisor;

pub use cia402::{Cia402State, derive_state, transition_to_state};
pub use supervisor::{DriveEvaluation, DrivePolicy, DriveSupervisorState};
