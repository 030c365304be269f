//! Integration test: paced loop runs until the shutdown flag is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ecat_control_unit::config::{CycleConfig, DriveUnitConfig};
use ecat_control_unit::cycle::PacingMode;

use super::{Fixture, test_config};

fn run_for(pacing: PacingMode, tag: &str) {
    let config = DriveUnitConfig {
        cycle: CycleConfig {
            period_us: 1000,
            pacing,
        },
        ..test_config()
    };
    let mut fx = Fixture::with_config(tag, config);
    fx.set_status(0x0040, 0x0040);

    let shutdown = Arc::new(AtomicBool::new(false));
    thread::scope(|s| {
        let flag = Arc::clone(&shutdown);
        s.spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::Release);
        });
        fx.control.run(&shutdown).unwrap();
    });

    let stats = fx.control.stats();
    assert!(stats.cycle_count > 5, "{stats:?}");
    assert!(stats.max_cycle_ns >= stats.min_cycle_ns);
    let records = fx.records();
    assert_eq!(records[0].control_word, 0x0006);
    assert_eq!(records[1].control_word, 0x0006);
}

#[test]
fn fixed_sleep_loop_stops_on_flag() {
    run_for(PacingMode::FixedSleep, "run_fixed");
}

#[test]
fn absolute_deadline_loop_stops_on_flag() {
    run_for(PacingMode::AbsoluteDeadline, "run_abs");
}

#[test]
fn preset_flag_exits_before_first_cycle() {
    let mut fx = Fixture::new("run_preset");
    let shutdown = AtomicBool::new(true);
    fx.control.run(&shutdown).unwrap();
    assert_eq!(fx.control.stats().cycle_count, 0);
}
