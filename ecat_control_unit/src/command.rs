//! Command path root.
//!
//! Intra-process command/odometry handoff and the command velocity limiter.

pub mod exchange;
pub mod limiter;

pub use exchange::CommandExchange;
pub use limiter::{CommandLimits, CommandVelocityLimiter, LimitError};
