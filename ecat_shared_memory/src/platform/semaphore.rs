//! POSIX named semaphore used as the binary lock shared with the master.

use super::OpenMode;
use crate::error::{ShmError, ShmResult};
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::time::{ClockId, clock_gettime};

/// Initial value of a freshly created semaphore (unlocked).
const SEM_INITIAL_VALUE: libc::c_uint = 1;

/// Owned handle to a named semaphore.
///
/// Dropping the handle closes it locally (`sem_close`); the named object
/// itself survives and stays shared with the counterpart process.
pub struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
}

// SAFETY: the handle refers to a process-shared semaphore whose operations
// are thread-safe; the pointer is never dereferenced by Rust code.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Open or create the semaphore `name` (already normalised to `/name`).
    pub fn open(name: &str, mode: OpenMode) -> ShmResult<Self> {
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName {
            name: name.to_string(),
        })?;

        let raw = unsafe {
            match mode {
                OpenMode::Create => libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT,
                    0o666 as libc::mode_t,
                    SEM_INITIAL_VALUE,
                ),
                OpenMode::Open => libc::sem_open(c_name.as_ptr(), 0),
            }
        };

        if raw == libc::SEM_FAILED {
            return Err(ShmError::OpenSemaphore {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        let sem = NonNull::new(raw).ok_or_else(|| ShmError::OpenSemaphore {
            name: name.to_string(),
            source: io::Error::from(io::ErrorKind::InvalidData),
        })?;

        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Semaphore name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking acquire. `Ok(false)` when the semaphore is held elsewhere.
    pub fn try_wait(&self) -> ShmResult<bool> {
        if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(false),
            _ => Err(ShmError::Lock {
                name: self.name.clone(),
                source: err,
            }),
        }
    }

    /// Blocking acquire, restarted on signal interruption.
    pub fn wait(&self) -> ShmResult<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(ShmError::Lock {
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
    }

    /// Acquire, giving up after `timeout`. `Ok(false)` on expiry.
    ///
    /// The deadline is absolute on `CLOCK_REALTIME`, as `sem_timedwait`
    /// requires, so a signal restart does not extend it.
    pub fn timed_wait(&self, timeout: Duration) -> ShmResult<bool> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(|e| ShmError::Lock {
            name: self.name.clone(),
            source: io::Error::from(e),
        })?;
        let deadline = now + TimeSpec::from(timeout);
        loop {
            if unsafe { libc::sem_timedwait(self.sem.as_ptr(), deadline.as_ref()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => {
                    return Err(ShmError::Lock {
                        name: self.name.clone(),
                        source: err,
                    });
                }
            }
        }
    }

    /// Release.
    pub fn post(&self) -> ShmResult<()> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(ShmError::Unlock {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            })
        }
    }

    /// Remove the named semaphore from the system.
    pub fn unlink(name: &str) -> ShmResult<()> {
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName {
            name: name.to_string(),
        })?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(ShmError::Unlink {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            })
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem.as_ptr());
        }
    }
}
