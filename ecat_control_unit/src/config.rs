//! Drive unit configuration: one TOML file, every section optional.
//!
//! Loaded through [`ConfigLoader`] and validated before any shared memory or
//! scheduling call is made. Validation failures map to
//! [`ConfigError::ValidationError`].

use std::path::Path;
use std::time::Duration;

use ecat_common::config::{ConfigError, ConfigLoader, SharedConfig};
use ecat_common::consts::{
    CYCLE_PERIOD_US, CYCLE_PERIOD_US_MAX, CYCLE_PERIOD_US_MIN, DEFAULT_RT_PRIORITY,
    DEFAULT_SEGMENT_NAME, DEFAULT_SEMAPHORE_NAME,
};
use ecat_shared_memory::OpenMode;
use serde::{Deserialize, Serialize};

use crate::comm::CommConfig;
use crate::command::CommandLimits;
use crate::cycle::PacingMode;
use crate::kinematics::KinematicsConfig;
use crate::state::DrivePolicy;

// ─── Sections ───────────────────────────────────────────────────────

/// How the shared segment and semaphore are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShmMode {
    /// Objects must already exist (created by the EtherCAT master).
    #[default]
    Open,
    /// Create missing objects and size the segment.
    Create,
}

impl From<ShmMode> for OpenMode {
    fn from(mode: ShmMode) -> Self {
        match mode {
            ShmMode::Open => OpenMode::Open,
            ShmMode::Create => OpenMode::Create,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    pub segment_name: String,
    pub semaphore_name: String,
    pub mode: ShmMode,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            semaphore_name: DEFAULT_SEMAPHORE_NAME.to_string(),
            mode: ShmMode::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Control period [µs].
    pub period_us: u32,
    pub pacing: PacingMode,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_us: CYCLE_PERIOD_US,
            pacing: PacingMode::default(),
        }
    }
}

impl CycleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_micros(u64::from(self.period_us))
    }
}

/// Real-time scheduling of the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// Skip every RT call when false (development hosts).
    pub enabled: bool,
    /// SCHED_FIFO priority, 1..=99.
    pub priority: i32,
    /// Pin the control thread to this core.
    pub cpu_core: Option<usize>,
    /// `mlockall(MCL_CURRENT | MCL_FUTURE)` before entering the loop.
    pub lock_memory: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: DEFAULT_RT_PRIORITY,
            cpu_core: None,
            lock_memory: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Send the CiA 402 shutdown command and zero targets after the loop exits.
    pub disable_drives: bool,
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete drive unit configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveUnitConfig {
    pub shared: SharedConfig,
    pub shm: ShmConfig,
    pub cycle: CycleConfig,
    pub rt: RtConfig,
    pub drive: DrivePolicy,
    pub kinematics: KinematicsConfig,
    /// Command limiting is off unless the section is present.
    pub limiter: Option<CommandLimits>,
    pub comm: CommConfig,
    pub shutdown: ShutdownConfig,
}

impl DriveUnitConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.shm.segment_name.trim_start_matches('/').is_empty() {
            return Err(invalid("shm.segment_name cannot be empty"));
        }
        if self.shm.semaphore_name.trim_start_matches('/').is_empty() {
            return Err(invalid("shm.semaphore_name cannot be empty"));
        }

        if !(CYCLE_PERIOD_US_MIN..=CYCLE_PERIOD_US_MAX).contains(&self.cycle.period_us) {
            return Err(invalid(format!(
                "cycle.period_us {} out of range [{CYCLE_PERIOD_US_MIN}, {CYCLE_PERIOD_US_MAX}]",
                self.cycle.period_us
            )));
        }

        if !(1..=99).contains(&self.rt.priority) {
            return Err(invalid(format!(
                "rt.priority {} out of range [1, 99]",
                self.rt.priority
            )));
        }

        self.kinematics.validate()?;
        if let Some(limits) = &self.limiter {
            limits.validate()?;
        }
        self.comm.validate()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Load from `path` (defaults when `None`) and validate.
pub fn load_config(path: Option<&Path>) -> Result<DriveUnitConfig, ConfigError> {
    let config = DriveUnitConfig::load_or_default(path)?;
    config.validate()?;
    Ok(config)
}
