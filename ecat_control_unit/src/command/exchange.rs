//! Command/odometry handoff between the control loop and the communication thread.
//!
//! Two owned value slots behind one mutex. Every operation holds the lock for
//! a single `Copy` of the value and nothing else; there is no queue, the last
//! write wins. Odometry publishes are numbered so a reader can tell a fresh
//! estimate from one it already forwarded, whatever its timestamp says.

use ecat_common::motion::{OdometryEstimate, VelocityCommand};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Slots {
    command: VelocityCommand,
    odometry: OdometryEstimate,
    /// Number of odometry publishes so far.
    odometry_seq: u64,
}

/// Shared between exactly two threads via `Arc<CommandExchange>`.
#[derive(Debug, Default)]
pub struct CommandExchange {
    slots: Mutex<Slots>,
}

impl CommandExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer: communication thread.
    #[inline]
    pub fn publish_command(&self, command: VelocityCommand) {
        self.slots.lock().command = command;
    }

    /// Reader: control loop. Returns the latest published command.
    #[inline]
    pub fn read_command(&self) -> VelocityCommand {
        self.slots.lock().command
    }

    /// Writer: control loop.
    #[inline]
    pub fn publish_odometry(&self, odometry: OdometryEstimate) {
        let mut slots = self.slots.lock();
        slots.odometry = odometry;
        slots.odometry_seq = slots.odometry_seq.wrapping_add(1);
    }

    /// Reader: communication thread.
    #[inline]
    pub fn read_odometry(&self) -> OdometryEstimate {
        self.slots.lock().odometry
    }

    /// Reader: communication thread. The latest estimate and its sequence
    /// number, or `None` while nothing was published after `seen`.
    #[inline]
    pub fn odometry_since(&self, seen: u64) -> Option<(u64, OdometryEstimate)> {
        let slots = self.slots.lock();
        (slots.odometry_seq != seen).then_some((slots.odometry_seq, slots.odometry))
    }
}
