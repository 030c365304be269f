//! Drive process-data record and CiA 402 word flags.
//!
//! `DriveRecord` is the per-drive slot of the shared segment exposed by the
//! EtherCAT master. Its layout (field order, width and padding) is part of the
//! inter-process contract and is pinned by compile-time assertions below.
//!
//! ## Ownership of fields
//!
//! | Field              | Writer          |
//! |--------------------|-----------------|
//! | `control_word`     | supervisor      |
//! | `status_word`      | EtherCAT master |
//! | `operation_mode`   | supervisor      |
//! | `target_velocity`  | supervisor      |
//! | `current_velocity` | EtherCAT master |

use bitflags::bitflags;
use static_assertions::const_assert_eq;

use crate::consts::DRIVE_COUNT;

/// One drive's cyclic process data, binary-compatible with the master's record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DriveRecord {
    /// CiA 402 control word (0x6040).
    pub control_word: u16,
    /// CiA 402 status word (0x6041), written by the master.
    pub status_word: u16,
    /// Mode of operation (0x6060).
    pub operation_mode: u8,
    /// Explicit padding to the 4-byte boundary of `target_velocity`.
    pub _pad: [u8; 3],
    /// Target velocity (0x60FF) in motor velocity units.
    pub target_velocity: i32,
    /// Velocity actual value (0x606C) in motor velocity units, written by the master.
    pub current_velocity: i32,
}

const_assert_eq!(core::mem::size_of::<DriveRecord>(), 16);
const_assert_eq!(core::mem::align_of::<DriveRecord>(), 4);
const_assert_eq!(core::mem::offset_of!(DriveRecord, control_word), 0);
const_assert_eq!(core::mem::offset_of!(DriveRecord, status_word), 2);
const_assert_eq!(core::mem::offset_of!(DriveRecord, operation_mode), 4);
const_assert_eq!(core::mem::offset_of!(DriveRecord, target_velocity), 8);
const_assert_eq!(core::mem::offset_of!(DriveRecord, current_velocity), 12);

/// The full slot array as laid out in the shared segment.
pub type DriveRecords = [DriveRecord; DRIVE_COUNT];

/// Size in bytes of the shared segment payload.
pub const SEGMENT_SIZE: usize = core::mem::size_of::<DriveRecords>();

const_assert_eq!(SEGMENT_SIZE, 32);

/// Fixed slot assignment of the two wheel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Wheel {
    /// Slot 0.
    Right = 0,
    /// Slot 1.
    Left = 1,
}

impl Wheel {
    /// Both wheels in slot order.
    pub const ALL: [Wheel; DRIVE_COUNT] = [Wheel::Right, Wheel::Left];

    /// Slot index in the shared segment.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Wheel::Right => "right",
            Wheel::Left => "left",
        }
    }
}

bitflags! {
    /// CiA 402 status word bits (object 0x6041).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON = 1 << 0;
        const SWITCHED_ON = 1 << 1;
        const OPERATION_ENABLED = 1 << 2;
        const FAULT = 1 << 3;
        const VOLTAGE_ENABLED = 1 << 4;
        const QUICK_STOP = 1 << 5;
        const SWITCH_ON_DISABLED = 1 << 6;
        const WARNING = 1 << 7;
        const REMOTE = 1 << 9;
        const TARGET_REACHED = 1 << 10;
    }
}

impl StatusWord {
    /// The three enable bits (ready, switched on, operation enabled).
    pub const ENABLE_BITS: Self = Self::READY_TO_SWITCH_ON
        .union(Self::SWITCHED_ON)
        .union(Self::OPERATION_ENABLED);

    /// Fault bit set while all enable bits are clear.
    #[inline]
    pub const fn is_fault_latched(self) -> bool {
        self.contains(Self::FAULT) && !self.intersects(Self::ENABLE_BITS)
    }
}

bitflags! {
    /// CiA 402 control word bits (object 0x6040).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON = 1 << 0;
        const ENABLE_VOLTAGE = 1 << 1;
        const QUICK_STOP = 1 << 2;
        const ENABLE_OPERATION = 1 << 3;
        const FAULT_RESET = 1 << 7;
        const HALT = 1 << 8;
    }
}

impl ControlWord {
    /// "Shutdown" command: leads the drive to READY_TO_SWITCH_ON (power stage off).
    pub const SHUTDOWN: Self = Self::ENABLE_VOLTAGE.union(Self::QUICK_STOP);
}
