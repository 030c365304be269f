//! Acceleration and velocity clamp for commanded values.

use ecat_common::config::ConfigError;
use ecat_common::motion::VelocityCommand;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bound set that would make [`CommandVelocityLimiter::limit`] panic.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LimitError {
    #[error("bounds must be finite")]
    NonFinite,

    #[error("min_vel {min} greater than max_vel {max}")]
    VelocityOrder { min: f64, max: f64 },

    #[error("min_acc {min} greater than max_acc {max}")]
    AccelerationOrder { min: f64, max: f64 },
}

/// Stateless acceleration/velocity limiter for one commanded quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandVelocityLimiter {
    /// Lower velocity bound.
    pub min_vel: f64,
    /// Upper velocity bound.
    pub max_vel: f64,
    /// Lower acceleration bound (typically negative).
    pub min_acc: f64,
    /// Upper acceleration bound.
    pub max_acc: f64,
}

impl CommandVelocityLimiter {
    /// Step from the last dispatched `command` towards `current_value`.
    ///
    /// The step `current_value - command` is clamped into
    /// `[min_acc·dt, max_acc·dt]`, added to `command`, and the sum is clamped
    /// into `[min_vel, max_vel]`. Bounds must be ordered; see [`Self::validate`].
    pub fn limit(&self, command: f64, current_value: f64, dt: f64) -> f64 {
        let requested_acc = current_value - command;
        let possible_acc = requested_acc.clamp(self.min_acc * dt, self.max_acc * dt);
        (command + possible_acc).clamp(self.min_vel, self.max_vel)
    }

    /// Bounds must be finite and ordered so `limit` never panics.
    pub fn validate(&self) -> Result<(), LimitError> {
        let all_finite = [self.min_vel, self.max_vel, self.min_acc, self.max_acc]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(LimitError::NonFinite);
        }
        if self.min_vel > self.max_vel {
            return Err(LimitError::VelocityOrder {
                min: self.min_vel,
                max: self.max_vel,
            });
        }
        if self.min_acc > self.max_acc {
            return Err(LimitError::AccelerationOrder {
                min: self.min_acc,
                max: self.max_acc,
            });
        }
        Ok(())
    }
}

/// Limiters for the two robot-frame command components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandLimits {
    /// Forward velocity [m/s], acceleration [m/s²].
    pub linear: CommandVelocityLimiter,
    /// Yaw rate [rad/s], angular acceleration [rad/s²].
    pub angular: CommandVelocityLimiter,
}

impl CommandLimits {
    /// Apply both limiters, stepping from `previous` towards `requested`.
    pub fn apply(
        &self,
        previous: VelocityCommand,
        requested: VelocityCommand,
        dt: f64,
    ) -> VelocityCommand {
        VelocityCommand {
            linear: self.linear.limit(previous.linear, requested.linear, dt),
            angular: self.angular.limit(previous.angular, requested.angular, dt),
        }
    }

    /// # Errors
    /// `ConfigError::ValidationError` naming the offending component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, limiter) in [("linear", &self.linear), ("angular", &self.angular)] {
            limiter
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("limiter.{name}: {e}")))?;
        }
        Ok(())
    }
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            linear: CommandVelocityLimiter {
                min_vel: -1.0,
                max_vel: 1.0,
                min_acc: -2.0,
                max_acc: 1.0,
            },
            angular: CommandVelocityLimiter {
                min_vel: -2.0,
                max_vel: 2.0,
                min_acc: -4.0,
                max_acc: 4.0,
            },
        }
    }
}
