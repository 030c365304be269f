//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur while opening or accessing the drive record channel.
///
/// Each initialisation sub-step has its own variant so the caller can report
/// exactly which POSIX object could not be set up.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Object name is not a valid POSIX IPC name
    #[error("Invalid POSIX object name: {name:?}")]
    InvalidName {
        /// Offending name
        name: String,
    },

    /// `shm_open` failed
    #[error("Failed to create/open shared memory object {name}: {source}")]
    CreateObject {
        /// Segment name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// Querying or sizing the segment failed
    #[error("Failed to size shared memory object {name}: {source}")]
    Resize {
        /// Segment name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// Existing segment is smaller than the drive record array
    #[error("Shared memory object {name} is {actual} bytes, need at least {required}")]
    SegmentTooSmall {
        /// Segment name
        name: String,
        /// Current object size in bytes
        actual: usize,
        /// Required size in bytes
        required: usize,
    },

    /// `mmap` failed
    #[error("Failed to map shared memory object {name}: {source}")]
    Map {
        /// Segment name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// `sem_open` failed
    #[error("Failed to open semaphore {name}: {source}")]
    OpenSemaphore {
        /// Semaphore name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// `sem_wait`/`sem_trywait` failed for a reason other than contention
    #[error("Failed to acquire semaphore {name}: {source}")]
    Lock {
        /// Semaphore name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// `sem_post` failed
    #[error("Failed to release semaphore {name}: {source}")]
    Unlock {
        /// Semaphore name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },

    /// Record count does not match the fixed slot count
    #[error("Record count mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Fixed slot count
        expected: usize,
        /// Count that was passed in
        actual: usize,
    },

    /// Removing a named object failed
    #[error("Failed to unlink {name}: {source}")]
    Unlink {
        /// Object name
        name: String,
        /// Source OS error
        source: std::io::Error,
    },
}

impl ShmError {
    /// True for failures of the one-time channel setup.
    pub fn is_init_failure(&self) -> bool {
        matches!(
            self,
            ShmError::InvalidName { .. }
                | ShmError::CreateObject { .. }
                | ShmError::Resize { .. }
                | ShmError::SegmentTooSmall { .. }
                | ShmError::Map { .. }
                | ShmError::OpenSemaphore { .. }
        )
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
