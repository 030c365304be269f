//! Integration test: shutdown drive-disable sequence.

use std::time::{Duration, Instant};

use ecat_common::motion::VelocityCommand;
use ecat_control_unit::config::CycleConfig;
use ecat_control_unit::cycle::CycleError;

use super::{Fixture, test_config};

#[test]
fn disable_drives_writes_shutdown_and_zero_targets() {
    let mut fx = Fixture::new("disable");
    fx.set_status(0x0237, 0x0237);
    fx.exchange.publish_command(VelocityCommand::new(1.0, 0.0));
    fx.control.step(0.0).unwrap();
    assert_ne!(fx.records()[0].target_velocity, 0);

    fx.control.disable_drives().unwrap();

    for record in fx.records() {
        assert_eq!(record.control_word, 0x0006);
        assert_eq!(record.target_velocity, 0);
        // Status words belong to the master and are preserved.
        assert_eq!(record.status_word, 0x0237);
    }
}

#[test]
fn disable_drives_releases_the_semaphore() {
    let mut fx = Fixture::new("disable_release");
    fx.control.disable_drives().unwrap();
    assert!(fx.master.try_lock().unwrap().is_some());
}

#[test]
fn disable_drives_gives_up_when_master_holds_the_semaphore() {
    let mut config = test_config();
    config.cycle = CycleConfig {
        period_us: 1000,
        ..Default::default()
    };
    let mut fx = Fixture::with_config("disable_timeout", config);
    fx.set_status(0x0237, 0x0237);

    let held = fx.master.lock().unwrap();
    let start = Instant::now();
    let result = fx.control.disable_drives();
    let waited = start.elapsed();
    drop(held);

    assert!(matches!(
        result,
        Err(CycleError::LockTimeout { timeout }) if timeout == Duration::from_millis(10)
    ));
    assert!(waited >= Duration::from_millis(8));
    assert!(waited < Duration::from_secs(1));
    // Nothing was written.
    assert_eq!(fx.records()[0].control_word, 0);
}
