//! # ECAT Shared Memory Channel
//!
//! Cross-process access to the drive records mirrored by an external
//! EtherCAT master. The master owns the fieldbus cycle and exposes one
//! POSIX shared memory object holding `[DriveRecord; 2]`, guarded by a POSIX
//! named binary semaphore (initial value 1). This crate maps that object and
//! serialises access through the semaphore.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐      ┌───────────────────────┐      ┌──────────────────┐
//! │ Control loop     │      │ /ethercat_data        │      │ EtherCAT master  │
//! │                  │      │ [DriveRecord; 2]      │      │                  │
//! │ SharedMemory-    ├─────►│ slot 0 = right wheel  │◄─────┤ fieldbus I/O     │
//! │ Channel          │      │ slot 1 = left wheel   │      │                  │
//! └────────┬─────────┘      └───────────────────────┘      └────────┬─────────┘
//!          │                ┌───────────────────────┐               │
//!          └───────────────►│ /ethercat_data_sem    │◄──────────────┘
//!                           │ binary semaphore      │
//!                           └───────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ecat_shared_memory::{OpenMode, SharedMemoryChannel, ShmResult};
//!
//! # fn main() -> ShmResult<()> {
//! let channel = SharedMemoryChannel::init("/ethercat_data", "/ethercat_data_sem", OpenMode::Open)?;
//!
//! // Never block the RT path: skip the cycle when the master holds the lock.
//! if let Some(mut guard) = channel.try_lock()? {
//!     if let Some(mut records) = guard.read() {
//!         records[0].target_velocity = 0;
//!         guard.write(&records)?;
//!     }
//!     guard.unlock()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifecycle
//!
//! Dropping a [`SharedMemoryChannel`] unmaps the segment and closes the
//! semaphore handle but never unlinks the named objects.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod platform;

pub use channel::{SharedMemoryChannel, ShmGuard};
pub use error::{ShmError, ShmResult};
pub use platform::OpenMode;
