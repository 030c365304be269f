//! Channel integration tests against real POSIX objects.
//!
//! Verifies:
//! 1. Write-then-read returns a bitwise-identical record array.
//! 2. Non-blocking and bounded acquisition are mutually exclusive across
//!    handles and threads.
//! 3. Record count mismatches are rejected.
//! 4. Dropping a channel leaves the named objects in place.

use ecat_common::consts::{CSV_OPERATION_MODE, DRIVE_COUNT};
use ecat_common::drive::{DriveRecord, Wheel};
use ecat_shared_memory::{OpenMode, SharedMemoryChannel, ShmError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

// ─── Helpers ────────────────────────────────────────────────────────

/// Unique object names per test and process.
fn names(tag: &str) -> (String, String) {
    let pid = std::process::id();
    (
        format!("/ecat_test_{tag}_{pid}"),
        format!("/ecat_test_{tag}_{pid}_sem"),
    )
}

/// Removes the named objects when the test ends, even on panic.
struct Cleanup(String, String);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = SharedMemoryChannel::unlink(&self.0, &self.1);
    }
}

fn create(tag: &str) -> (SharedMemoryChannel, Cleanup) {
    let (seg, sem) = names(tag);
    let channel = SharedMemoryChannel::init(&seg, &sem, OpenMode::Create).expect("init");
    (channel, Cleanup(seg, sem))
}

fn sample_records() -> [DriveRecord; DRIVE_COUNT] {
    [
        DriveRecord {
            control_word: 0x000F,
            status_word: 0x0637,
            operation_mode: CSV_OPERATION_MODE,
            target_velocity: 12_345,
            current_velocity: 12_001,
            ..Default::default()
        },
        DriveRecord {
            control_word: 0x0006,
            status_word: 0x0250,
            operation_mode: CSV_OPERATION_MODE,
            target_velocity: -12_345,
            current_velocity: i32::MIN,
            ..Default::default()
        },
    ]
}

// ─── Round trip ─────────────────────────────────────────────────────

#[test]
fn fresh_segment_reads_zeroed() {
    let (channel, _cleanup) = create("zero");
    let guard = channel.try_lock().unwrap().expect("lock free");
    let records = guard.read().expect("mapped");
    assert_eq!(records, [DriveRecord::default(); DRIVE_COUNT]);
}

#[test]
fn write_then_read_is_bitwise_identical() {
    let (channel, _cleanup) = create("roundtrip");
    let written = sample_records();

    let mut guard = channel.lock().unwrap();
    guard.write(&written).unwrap();
    guard.unlock().unwrap();

    let guard = channel.try_lock().unwrap().expect("lock free");
    let read = guard.read().expect("mapped");
    assert_eq!(read, written);
    assert_eq!(read[Wheel::Left.index()].current_velocity, i32::MIN);
}

#[test]
fn second_handle_sees_first_handle_writes() {
    let (writer, _cleanup) = create("shared_view");
    let (seg, sem) = names("shared_view");
    let reader = SharedMemoryChannel::init(&seg, &sem, OpenMode::Open).unwrap();

    let written = sample_records();
    writer.lock().unwrap().write(&written).unwrap();

    let guard = reader.lock().unwrap();
    assert_eq!(guard.read().unwrap(), written);
}

// ─── Mutual exclusion ───────────────────────────────────────────────

#[test]
fn try_lock_fails_while_other_handle_holds_lock() {
    let (first, _cleanup) = create("exclusive");
    let (seg, sem) = names("exclusive");
    let second = SharedMemoryChannel::init(&seg, &sem, OpenMode::Open).unwrap();

    let held = first.try_lock().unwrap().expect("first acquires");
    assert!(second.try_lock().unwrap().is_none());
    assert!(second.try_lock().unwrap().is_none());

    held.unlock().unwrap();
    assert!(second.try_lock().unwrap().is_some());
}

#[test]
fn concurrent_try_lock_has_single_winner() {
    const THREADS: usize = 8;
    let (channel, _cleanup) = create("race");
    let channel = Arc::new(channel);
    let winners = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let channel = Arc::clone(&channel);
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let guard = channel.try_lock().unwrap();
                if guard.is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                // Hold until every thread has attempted.
                barrier.wait();
                drop(guard);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(channel.try_lock().unwrap().is_some(), "lock released");
}

#[test]
fn dropped_guard_releases_lock() {
    let (channel, _cleanup) = create("drop_guard");
    {
        let _guard = channel.try_lock().unwrap().expect("acquire");
        assert!(channel.try_lock().unwrap().is_none());
    }
    assert!(channel.try_lock().unwrap().is_some());
}

#[test]
fn lock_timeout_gives_up_while_other_handle_holds_lock() {
    let (first, _cleanup) = create("timeout");
    let (seg, sem) = names("timeout");
    let second = SharedMemoryChannel::init(&seg, &sem, OpenMode::Open).unwrap();

    let held = first.try_lock().unwrap().expect("first acquires");
    let start = Instant::now();
    assert!(second.lock_timeout(Duration::from_millis(20)).unwrap().is_none());
    assert!(start.elapsed() >= Duration::from_millis(15));

    held.unlock().unwrap();
    let guard = second.lock_timeout(Duration::from_millis(20)).unwrap();
    assert!(guard.is_some());
}

// ─── Contract violations ────────────────────────────────────────────

#[test]
fn write_rejects_wrong_record_count() {
    let (channel, _cleanup) = create("mismatch");
    let mut guard = channel.lock().unwrap();

    let one = [DriveRecord::default(); 1];
    let err = guard.write(&one).unwrap_err();
    assert!(matches!(
        err,
        ShmError::SizeMismatch {
            expected: 2,
            actual: 1
        }
    ));

    let three = [DriveRecord::default(); 3];
    assert!(guard.write(&three).is_err());

    // Nothing was written.
    assert_eq!(guard.read().unwrap(), [DriveRecord::default(); DRIVE_COUNT]);
}

#[test]
fn open_mode_without_master_is_init_failure() {
    let (seg, sem) = names("absent");
    let err = SharedMemoryChannel::init(&seg, &sem, OpenMode::Open)
        .err()
        .expect("nothing to attach to");
    assert!(err.is_init_failure());
    assert!(matches!(err, ShmError::CreateObject { .. }));
}

#[test]
fn invalid_names_are_rejected_before_any_syscall() {
    let err = SharedMemoryChannel::init("bad/name", "/ok", OpenMode::Create)
        .err()
        .expect("invalid");
    assert!(matches!(err, ShmError::InvalidName { .. }));
}

// ─── Lifecycle ──────────────────────────────────────────────────────

#[test]
fn drop_keeps_named_objects() {
    let (seg, sem) = names("persist");
    let _cleanup = Cleanup(seg.clone(), sem.clone());
    let written = sample_records();

    {
        let channel = SharedMemoryChannel::init(&seg, &sem, OpenMode::Create).unwrap();
        channel.lock().unwrap().write(&written).unwrap();
    }

    let reopened = SharedMemoryChannel::init(&seg, &sem, OpenMode::Open).unwrap();
    assert_eq!(reopened.segment_name(), seg);
    assert_eq!(reopened.semaphore_name(), sem);
    let guard = reopened.try_lock().unwrap().expect("released before drop");
    assert_eq!(guard.read().unwrap(), written);
}
