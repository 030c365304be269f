//! Robot-frame ↔ wheel ↔ motor velocity conversion and odometry.
//!
//! The control loop only talks to the [`Kinematics`] trait; [`DifferentialDrive`]
//! is the default two-wheel implementation.

use std::f64::consts::PI;

use ecat_common::config::ConfigError;
use ecat_common::drive::Wheel;
use ecat_common::motion::{OdometryEstimate, VelocityCommand};
use serde::{Deserialize, Serialize};

/// Linear velocity of each wheel's contact point [m/s].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelVelocities {
    pub right: f64,
    pub left: f64,
}

impl WheelVelocities {
    #[inline]
    pub fn get(&self, wheel: Wheel) -> f64 {
        match wheel {
            Wheel::Right => self.right,
            Wheel::Left => self.left,
        }
    }
}

/// Conversion between robot commands, wheel speeds and drive units.
pub trait Kinematics: Send {
    /// Robot-frame command → wheel linear velocities.
    fn wheel_velocities(&self, command: VelocityCommand) -> WheelVelocities;

    /// Wheel linear velocity → drive `target_velocity` units.
    fn motor_velocity(&self, wheel: Wheel, linear_mps: f64) -> i32;

    /// Drive `current_velocity` units → wheel linear velocity.
    fn wheel_velocity(&self, wheel: Wheel, motor: i32) -> f64;

    /// Integrate one measurement pair taken at `timestamp` [s].
    fn update_odometry(&mut self, right_mps: f64, left_mps: f64, timestamp: f64)
    -> OdometryEstimate;
}

// ─── Configuration ──────────────────────────────────────────────────

/// Geometry and drive scaling of a differential-drive base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Wheel radius [m].
    pub wheel_radius_m: f64,
    /// Distance between the wheel contact points [m].
    pub track_width_m: f64,
    /// Motor revolutions per wheel revolution.
    pub gear_ratio: f64,
    /// Drive velocity units per motor rpm.
    pub velocity_scale: f64,
    /// Left motor is mounted mirrored; flip its sign both ways.
    pub invert_left: bool,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            wheel_radius_m: 0.085,
            track_width_m: 0.44,
            gear_ratio: 1.0,
            velocity_scale: 0.1,
            invert_left: true,
        }
    }
}

impl KinematicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("wheel_radius_m", self.wheel_radius_m),
            ("track_width_m", self.track_width_m),
            ("gear_ratio", self.gear_ratio),
            ("velocity_scale", self.velocity_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "kinematics.{name} must be finite and > 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ─── Differential drive ─────────────────────────────────────────────

/// Two-wheel differential drive with midpoint odometry integration.
#[derive(Debug, Clone)]
pub struct DifferentialDrive {
    config: KinematicsConfig,
    /// Drive units per (m/s) of wheel speed.
    units_per_mps: f64,
    pose: OdometryEstimate,
    last_timestamp: Option<f64>,
}

impl DifferentialDrive {
    pub fn new(config: KinematicsConfig) -> Self {
        let units_per_mps =
            config.gear_ratio * 60.0 / (2.0 * PI) * config.velocity_scale / config.wheel_radius_m;
        Self {
            config,
            units_per_mps,
            pose: OdometryEstimate::default(),
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &KinematicsConfig {
        &self.config
    }

    #[inline]
    fn sign(&self, wheel: Wheel) -> f64 {
        if wheel == Wheel::Left && self.config.invert_left {
            -1.0
        } else {
            1.0
        }
    }
}

impl Kinematics for DifferentialDrive {
    fn wheel_velocities(&self, command: VelocityCommand) -> WheelVelocities {
        let half_track = self.config.track_width_m / 2.0;
        WheelVelocities {
            right: command.linear + command.angular * half_track,
            left: command.linear - command.angular * half_track,
        }
    }

    fn motor_velocity(&self, wheel: Wheel, linear_mps: f64) -> i32 {
        // `as` saturates at the i32 bounds and maps NaN to 0.
        (linear_mps * self.units_per_mps * self.sign(wheel)).round() as i32
    }

    fn wheel_velocity(&self, wheel: Wheel, motor: i32) -> f64 {
        f64::from(motor) * self.sign(wheel) / self.units_per_mps
    }

    fn update_odometry(
        &mut self,
        right_mps: f64,
        left_mps: f64,
        timestamp: f64,
    ) -> OdometryEstimate {
        let dt = match self.last_timestamp {
            Some(last) => (timestamp - last).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp);

        let linear = (right_mps + left_mps) / 2.0;
        let angular = (right_mps - left_mps) / self.config.track_width_m;

        let heading_mid = self.pose.theta + angular * dt / 2.0;
        let x = self.pose.x + linear * dt * heading_mid.cos();
        let y = self.pose.y + linear * dt * heading_mid.sin();
        let theta = self.pose.theta + angular * dt;

        self.pose = OdometryEstimate {
            timestamp,
            x,
            y,
            theta: theta.sin().atan2(theta.cos()),
            linear,
            angular,
        };
        self.pose
    }
}
