//! Shared fixture: a control loop plus a "master" handle on the same objects.

mod drive_gate;
mod lock_discipline;
mod run_loop;
mod shutdown;
mod startup;

use std::sync::Arc;

use ecat_common::drive::{DriveRecord, DriveRecords};
use ecat_control_unit::command::CommandExchange;
use ecat_control_unit::config::{DriveUnitConfig, RtConfig};
use ecat_control_unit::cycle::ControlLoop;
use ecat_control_unit::kinematics::DifferentialDrive;
use ecat_shared_memory::{OpenMode, SharedMemoryChannel};

pub struct Fixture {
    pub control: ControlLoop<DifferentialDrive>,
    pub master: SharedMemoryChannel,
    pub exchange: Arc<CommandExchange>,
    pub kinematics: DifferentialDrive,
    segment: String,
    semaphore: String,
}

impl Fixture {
    pub fn new(tag: &str) -> Self {
        Self::with_config(tag, test_config())
    }

    pub fn with_config(tag: &str, config: DriveUnitConfig) -> Self {
        let pid = std::process::id();
        let segment = format!("/ecat_it_{pid}_{tag}");
        let semaphore = format!("/ecat_it_{pid}_{tag}_sem");
        let _ = SharedMemoryChannel::unlink(&segment, &semaphore);

        let master = SharedMemoryChannel::init(&segment, &semaphore, OpenMode::Create).unwrap();
        let channel = SharedMemoryChannel::init(&segment, &semaphore, OpenMode::Open).unwrap();
        let exchange = Arc::new(CommandExchange::new());
        let kinematics = DifferentialDrive::new(config.kinematics);
        let control = ControlLoop::new(
            channel,
            kinematics.clone(),
            Arc::clone(&exchange),
            &config,
        );

        Self {
            control,
            master,
            exchange,
            kinematics,
            segment,
            semaphore,
        }
    }

    /// Master side: set both status words.
    pub fn set_status(&self, right: u16, left: u16) {
        self.modify(|records| {
            records[0].status_word = right;
            records[1].status_word = left;
        });
    }

    /// Master side: read-modify-write under the semaphore.
    pub fn modify(&self, f: impl FnOnce(&mut DriveRecords)) {
        let mut guard = self.master.lock().unwrap();
        let mut records = guard.read().unwrap();
        f(&mut records);
        guard.write(&records).unwrap();
    }

    /// Another handle on the same named objects.
    pub fn open_handle(&self) -> SharedMemoryChannel {
        SharedMemoryChannel::init(&self.segment, &self.semaphore, OpenMode::Open).unwrap()
    }

    /// Master side: snapshot of both slots.
    pub fn records(&self) -> [DriveRecord; 2] {
        self.master.lock().unwrap().read().unwrap()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = SharedMemoryChannel::unlink(&self.segment, &self.semaphore);
    }
}

pub fn test_config() -> DriveUnitConfig {
    DriveUnitConfig {
        rt: RtConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Minimal CiA 402 drive: answers each control word with the next status word.
pub fn drive_response(control_word: u16, status_word: u16) -> u16 {
    match control_word & 0x008F {
        0x0006 => 0x0231,
        0x0007 => 0x0233,
        0x000F => 0x0237,
        0x0080 => 0x0250,
        _ => status_word,
    }
}
