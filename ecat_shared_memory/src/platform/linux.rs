//! Linux shared memory object handling (`shm_open` + `mmap`).

use super::OpenMode;
use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use std::fs::File;

/// Longest accepted object name. Semaphores get a `sem.` prefix under
/// `/dev/shm`, which must still fit in NAME_MAX.
const MAX_NAME_LEN: usize = 250;

/// Normalise a POSIX IPC object name to the `/name` form.
///
/// A missing leading slash is added. Embedded slashes, NUL bytes and empty
/// names are rejected.
pub fn object_name(name: &str) -> ShmResult<String> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() || bare.len() > MAX_NAME_LEN || bare.contains(['/', '\0']) {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(format!("/{bare}"))
}

/// Open (or create) the named object and map `size` bytes of it read/write.
///
/// In [`OpenMode::Create`] a fresh or undersized object is grown to `size`;
/// an existing larger object is left as is. In [`OpenMode::Open`] the object
/// must already exist with at least `size` bytes.
pub fn map_segment(name: &str, mode: OpenMode, size: usize) -> ShmResult<MmapMut> {
    let (flags, perm) = match mode {
        OpenMode::Create => (
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        ),
        OpenMode::Open => (OFlag::O_RDWR, Mode::empty()),
    };

    let fd = shm_open(name, flags, perm).map_err(|errno| ShmError::CreateObject {
        name: name.to_string(),
        source: errno.into(),
    })?;
    let file = File::from(fd);

    let current = file
        .metadata()
        .map_err(|source| ShmError::Resize {
            name: name.to_string(),
            source,
        })?
        .len() as usize;

    if current < size {
        match mode {
            OpenMode::Create => {
                ftruncate(&file, size as libc::off_t).map_err(|errno| ShmError::Resize {
                    name: name.to_string(),
                    source: errno.into(),
                })?;
            }
            OpenMode::Open => {
                return Err(ShmError::SegmentTooSmall {
                    name: name.to_string(),
                    actual: current,
                    required: size,
                });
            }
        }
    }

    // The mapping stays valid after `file` is closed at the end of this scope.
    let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(|source| {
        ShmError::Map {
            name: name.to_string(),
            source,
        }
    })?;

    Ok(mmap)
}

/// Remove the named shared memory object.
pub fn unlink_segment(name: &str) -> ShmResult<()> {
    shm_unlink(name).map_err(|errno| ShmError::Unlink {
        name: name.to_string(),
        source: errno.into(),
    })
}
