//! Platform layer: POSIX shared memory objects and named semaphores.

mod linux;
mod semaphore;

pub use linux::{map_segment, object_name, unlink_segment};
pub use semaphore::NamedSemaphore;

use std::fmt;

/// How the named objects are obtained at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Attach to objects the EtherCAT master already created.
    #[default]
    Open,
    /// Create the objects if missing, attach otherwise.
    Create,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Open => f.write_str("open"),
            OpenMode::Create => f.write_str("create"),
        }
    }
}
