//! Robot-frame command and odometry value types exchanged with the
//! communication collaborator.

use serde::{Deserialize, Serialize};

/// Robot-frame velocity command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity [m/s].
    pub linear: f64,
    /// Yaw rate [rad/s].
    pub angular: f64,
}

impl VelocityCommand {
    /// The all-zero command.
    pub const ZERO: Self = Self {
        linear: 0.0,
        angular: 0.0,
    };

    pub const fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Planar pose and twist estimate integrated from the wheel speeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryEstimate {
    /// Sample time [s since UNIX epoch].
    pub timestamp: f64,
    /// Position x [m].
    pub x: f64,
    /// Position y [m].
    pub y: f64,
    /// Heading [rad], wrapped to (-π, π].
    pub theta: f64,
    /// Forward velocity [m/s].
    pub linear: f64,
    /// Yaw rate [rad/s].
    pub angular: f64,
}
