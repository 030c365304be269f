//! Integration test: actuation gate, lock contention, odometry, limiter.

use ecat_common::drive::Wheel;
use ecat_common::motion::VelocityCommand;
use ecat_control_unit::command::{CommandLimits, CommandVelocityLimiter};
use ecat_control_unit::config::DriveUnitConfig;
use ecat_control_unit::cycle::CycleOutcome;
use ecat_control_unit::kinematics::{KinematicsConfig, Kinematics};

use super::{Fixture, test_config};

#[test]
fn one_drive_not_enabled_zeroes_both_targets() {
    let mut fx = Fixture::new("gate_mixed");
    fx.set_status(0x0037, 0x0040);
    fx.exchange.publish_command(VelocityCommand::new(1.0, 0.0));

    let outcome = fx.control.step(0.0).unwrap();

    assert_eq!(outcome, CycleOutcome::Completed { operational: false });
    let records = fx.records();
    assert_eq!(records[0].target_velocity, 0);
    assert_eq!(records[1].target_velocity, 0);
    assert_eq!(records[1].control_word, 0x0006);
    assert!(fx.control.drives()[0].is_operational);
    assert!(!fx.control.drives()[1].is_operational);
}

#[test]
fn both_enabled_dispatches_wheel_targets() {
    let mut fx = Fixture::new("gate_open");
    fx.set_status(0x0237, 0x0237);
    let command = VelocityCommand::new(0.8, 0.5);
    fx.exchange.publish_command(command);

    let outcome = fx.control.step(0.0).unwrap();

    assert_eq!(outcome, CycleOutcome::Completed { operational: true });
    let wheels = fx.kinematics.wheel_velocities(command);
    let records = fx.records();
    assert_eq!(
        records[0].target_velocity,
        fx.kinematics.motor_velocity(Wheel::Right, wheels.right)
    );
    assert_eq!(
        records[1].target_velocity,
        fx.kinematics.motor_velocity(Wheel::Left, wheels.left)
    );
    assert_ne!(records[0].target_velocity, 0);
}

#[test]
fn fault_on_one_drive_closes_gate_in_same_cycle() {
    let mut fx = Fixture::new("gate_fault");
    fx.set_status(0x0237, 0x0237);
    fx.exchange.publish_command(VelocityCommand::new(1.0, 0.0));
    fx.control.step(0.0).unwrap();
    assert_ne!(fx.records()[0].target_velocity, 0);

    fx.set_status(0x0237, 0x0218);
    let outcome = fx.control.step(0.002).unwrap();

    assert_eq!(outcome, CycleOutcome::Completed { operational: false });
    let records = fx.records();
    assert_eq!(records[0].target_velocity, 0);
    assert_eq!(records[1].target_velocity, 0);
    assert_eq!(records[1].control_word, 0x0080);
}

#[test]
fn unknown_status_word_is_not_operational() {
    let mut fx = Fixture::new("gate_unknown");
    fx.set_status(0x0237, 0x0041);
    fx.exchange.publish_command(VelocityCommand::new(1.0, 0.0));

    let outcome = fx.control.step(0.0).unwrap();

    assert_eq!(outcome, CycleOutcome::Completed { operational: false });
    assert!(fx.records().iter().all(|r| r.target_velocity == 0));
}

#[test]
fn busy_semaphore_skips_the_cycle() {
    let mut fx = Fixture::new("busy");
    fx.set_status(0x0040, 0x0040);

    let held = fx.master.lock().unwrap();
    let outcome = fx.control.step(1.0).unwrap();
    assert_eq!(outcome, CycleOutcome::LockBusy);
    assert_eq!(fx.control.stats().lock_misses, 1);
    drop(held);

    // Nothing was written and no odometry was produced.
    let records = fx.records();
    assert_eq!(records[0].control_word, 0);
    assert_eq!(records[0].operation_mode, 0);
    assert_eq!(fx.exchange.read_odometry().timestamp, 0.0);

    assert!(matches!(
        fx.control.step(1.002).unwrap(),
        CycleOutcome::Completed { .. }
    ));
    assert_eq!(fx.records()[0].control_word, 0x0006);
}

#[test]
fn odometry_published_from_measured_velocities() {
    let mut fx = Fixture::new("odom");
    let right = fx.kinematics.motor_velocity(Wheel::Right, 0.5);
    let left = fx.kinematics.motor_velocity(Wheel::Left, 0.5);
    fx.modify(|records| {
        records[0].current_velocity = right;
        records[1].current_velocity = left;
    });

    fx.control.step(100.0).unwrap();
    let first = fx.exchange.read_odometry();
    assert_eq!(first.timestamp, 100.0);
    assert_eq!(first.x, 0.0);

    fx.control.step(102.0).unwrap();
    let odom = fx.exchange.read_odometry();
    assert_eq!(odom.timestamp, 102.0);
    assert!((odom.linear - 0.5).abs() < 0.05, "{odom:?}");
    assert!((odom.x - 1.0).abs() < 0.1, "{odom:?}");
    assert!(odom.angular.abs() < 1e-9);
}

#[test]
fn limiter_ramps_command_and_resets_when_gate_closes() {
    let config = DriveUnitConfig {
        kinematics: KinematicsConfig {
            velocity_scale: 1000.0,
            ..Default::default()
        },
        limiter: Some(CommandLimits {
            linear: CommandVelocityLimiter {
                min_vel: -1.0,
                max_vel: 1.0,
                min_acc: -2.0,
                max_acc: 1.0,
            },
            ..Default::default()
        }),
        ..test_config()
    };
    let mut fx = Fixture::with_config("limiter", config);
    fx.set_status(0x0237, 0x0237);
    fx.exchange.publish_command(VelocityCommand::new(1.0, 0.0));

    // period 2 ms, max_acc 1 m/s² → 2 mm/s per cycle
    fx.control.step(0.0).unwrap();
    let expected = fx.kinematics.motor_velocity(Wheel::Right, 0.002);
    assert_eq!(fx.records()[0].target_velocity, expected);

    fx.control.step(0.002).unwrap();
    let expected = fx.kinematics.motor_velocity(Wheel::Right, 0.004);
    assert_eq!(fx.records()[0].target_velocity, expected);

    // Gate closes, limiter restarts from standstill.
    fx.set_status(0x0237, 0x0040);
    fx.control.step(0.004).unwrap();
    assert_eq!(fx.records()[0].target_velocity, 0);

    fx.set_status(0x0237, 0x0237);
    fx.control.step(0.006).unwrap();
    let expected = fx.kinematics.motor_velocity(Wheel::Right, 0.002);
    assert_eq!(fx.records()[0].target_velocity, expected);
}
