//! Semaphore-guarded access to the drive record array.
//!
//! The named semaphore is the only mutual-exclusion mechanism over the
//! segment and is shared with the EtherCAT master process. Records can only
//! be read or written through an [`ShmGuard`], which exists only while the
//! semaphore is held.

use crate::error::{ShmError, ShmResult};
use crate::platform::{self, NamedSemaphore, OpenMode};
use ecat_common::consts::DRIVE_COUNT;
use ecat_common::drive::{DriveRecord, DriveRecords, SEGMENT_SIZE};
use memmap2::MmapMut;
use std::ptr::NonNull;
use std::time::Duration;
use tracing::{debug, error, info};

/// Mapped drive record segment plus its lock.
///
/// Dropping the channel unmaps the segment and closes the semaphore handle.
/// The named OS objects are never removed here: they may belong to the master
/// and must survive a restart of this process.
pub struct SharedMemoryChannel {
    segment_name: String,
    semaphore: NamedSemaphore,
    mmap: MmapMut,
    base: NonNull<DriveRecord>,
}

// SAFETY: the mapping is only touched through volatile copies performed while
// the process-shared semaphore is held.
unsafe impl Send for SharedMemoryChannel {}
unsafe impl Sync for SharedMemoryChannel {}

impl SharedMemoryChannel {
    /// Create-or-open the segment and semaphore and map the record array.
    ///
    /// # Errors
    /// One distinct [`ShmError`] variant per failing sub-step (name check,
    /// object creation, sizing, mapping, semaphore open).
    pub fn init(segment_name: &str, semaphore_name: &str, mode: OpenMode) -> ShmResult<Self> {
        let segment_name = platform::object_name(segment_name)?;
        let semaphore_name = platform::object_name(semaphore_name)?;

        let mut mmap = platform::map_segment(&segment_name, mode, SEGMENT_SIZE)?;
        let base = NonNull::new(mmap.as_mut_ptr().cast::<DriveRecord>()).ok_or_else(|| {
            ShmError::Map {
                name: segment_name.clone(),
                source: std::io::Error::from(std::io::ErrorKind::InvalidData),
            }
        })?;

        let semaphore = NamedSemaphore::open(&semaphore_name, mode)?;

        info!(
            "Shared memory channel ready: segment={} semaphore={} mode={} size={}B",
            segment_name, semaphore_name, mode, SEGMENT_SIZE
        );

        Ok(Self {
            segment_name,
            semaphore,
            mmap,
            base,
        })
    }

    /// Non-blocking acquisition. `Ok(None)` when the lock is held elsewhere.
    pub fn try_lock(&self) -> ShmResult<Option<ShmGuard<'_>>> {
        if self.semaphore.try_wait()? {
            Ok(Some(ShmGuard::new(self)))
        } else {
            Ok(None)
        }
    }

    /// Blocking acquisition, for paths where a bounded wait is acceptable.
    pub fn lock(&self) -> ShmResult<ShmGuard<'_>> {
        self.semaphore.wait()?;
        Ok(ShmGuard::new(self))
    }

    /// Blocking acquisition bounded by `timeout`. `Ok(None)` when it expires.
    pub fn lock_timeout(&self, timeout: Duration) -> ShmResult<Option<ShmGuard<'_>>> {
        if self.semaphore.timed_wait(timeout)? {
            Ok(Some(ShmGuard::new(self)))
        } else {
            Ok(None)
        }
    }

    /// Normalised segment object name.
    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    /// Normalised semaphore object name.
    pub fn semaphore_name(&self) -> &str {
        self.semaphore.name()
    }

    /// Remove both named objects from the system.
    ///
    /// Only for owners of the objects' lifetime (tests, tooling); the control
    /// loop never calls this.
    pub fn unlink(segment_name: &str, semaphore_name: &str) -> ShmResult<()> {
        let segment_name = platform::object_name(segment_name)?;
        let semaphore_name = platform::object_name(semaphore_name)?;
        platform::unlink_segment(&segment_name)?;
        NamedSemaphore::unlink(&semaphore_name)?;
        debug!("Unlinked {} and {}", segment_name, semaphore_name);
        Ok(())
    }

    fn is_mapped(&self) -> bool {
        self.mmap.len() >= SEGMENT_SIZE
    }
}

/// Proof that the channel semaphore is held. Releases on drop.
pub struct ShmGuard<'a> {
    channel: &'a SharedMemoryChannel,
    released: bool,
}

impl<'a> ShmGuard<'a> {
    fn new(channel: &'a SharedMemoryChannel) -> Self {
        Self {
            channel,
            released: false,
        }
    }

    /// Snapshot copy of both slots; `None` if the segment is not mapped in full.
    pub fn read(&self) -> Option<DriveRecords> {
        if !self.channel.is_mapped() {
            return None;
        }
        let base = self.channel.base.as_ptr();
        let mut records = [DriveRecord::default(); DRIVE_COUNT];
        for (slot, record) in records.iter_mut().enumerate() {
            // SAFETY: `is_mapped` guarantees DRIVE_COUNT records behind `base`,
            // which is page-aligned.
            *record = unsafe { std::ptr::read_volatile(base.add(slot)) };
        }
        Some(records)
    }

    /// Overwrite both slots.
    ///
    /// # Errors
    /// `ShmError::SizeMismatch` unless exactly `DRIVE_COUNT` records are given.
    pub fn write(&mut self, records: &[DriveRecord]) -> ShmResult<()> {
        if records.len() != DRIVE_COUNT || !self.channel.is_mapped() {
            return Err(ShmError::SizeMismatch {
                expected: DRIVE_COUNT,
                actual: records.len(),
            });
        }
        let base = self.channel.base.as_ptr();
        for (slot, record) in records.iter().enumerate() {
            // SAFETY: bounds checked above.
            unsafe { std::ptr::write_volatile(base.add(slot), *record) };
        }
        Ok(())
    }

    /// Release the semaphore, reporting a failed `sem_post`.
    pub fn unlock(mut self) -> ShmResult<()> {
        self.released = true;
        self.channel.semaphore.post()
    }
}

impl Drop for ShmGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.channel.semaphore.post() {
                error!("Semaphore release failed: {e}");
            }
        }
    }
}
