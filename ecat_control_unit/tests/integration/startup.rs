//! Integration test: drives walk from SWITCH_ON_DISABLED to OPERATION_ENABLED.

use ecat_common::consts::CSV_OPERATION_MODE;
use ecat_common::motion::VelocityCommand;
use ecat_control_unit::cycle::CycleOutcome;
use ecat_control_unit::state::Cia402State;

use super::{Fixture, drive_response};

#[test]
fn operation_mode_is_forced_to_csv() {
    let mut fx = Fixture::new("csv");
    fx.modify(|records| {
        records[0].operation_mode = 0x01;
        records[1].operation_mode = 0x08;
    });

    fx.control.step(0.0).unwrap();

    for record in fx.records() {
        assert_eq!(record.operation_mode, CSV_OPERATION_MODE);
    }
}

#[test]
fn enable_sequence_reaches_operation_enabled() {
    let mut fx = Fixture::new("enable");
    fx.set_status(0x0250, 0x0250);
    fx.exchange.publish_command(VelocityCommand::new(0.5, 0.0));

    let mut control_words = Vec::new();
    for cycle in 0..3 {
        let outcome = fx.control.step(cycle as f64 * 0.002).unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { operational: false });

        let records = fx.records();
        control_words.push(records[0].control_word);
        assert_eq!(records[0].target_velocity, 0);
        assert_eq!(records[1].target_velocity, 0);

        // Master answers the control words.
        fx.modify(|records| {
            for record in records.iter_mut() {
                record.status_word = drive_response(record.control_word, record.status_word);
            }
        });
    }
    assert_eq!(control_words, vec![0x0006, 0x0007, 0x000F]);

    let outcome = fx.control.step(0.006).unwrap();
    assert_eq!(outcome, CycleOutcome::Completed { operational: true });
    assert!(fx.control.drives().iter().all(|d| d.is_operational));
    assert_eq!(
        fx.control.drives()[1].previous_state,
        Cia402State::OperationEnabled
    );

    let records = fx.records();
    assert_eq!(records[0].control_word, 0x000F);
    assert!(records[0].target_velocity > 0);
    assert!(records[1].target_velocity < 0);
}

#[test]
fn fault_is_reset_then_drive_re_enabled() {
    let mut fx = Fixture::new("fault");
    fx.set_status(0x0218, 0x0250);

    fx.control.step(0.0).unwrap();
    let records = fx.records();
    assert_eq!(records[0].control_word, 0x0080);
    assert_eq!(records[1].control_word, 0x0006);

    for cycle in 1..8 {
        fx.modify(|records| {
            for record in records.iter_mut() {
                record.status_word = drive_response(record.control_word, record.status_word);
            }
        });
        fx.control.step(cycle as f64 * 0.002).unwrap();
    }
    assert!(fx.control.drives().iter().all(|d| d.is_operational));
}

#[test]
fn restart_keeps_control_word_of_enabled_drive() {
    let mut fx = Fixture::new("restart");
    // Left over from a previous run: both drives enabled.
    fx.modify(|records| {
        for record in records.iter_mut() {
            record.status_word = 0x0237;
            record.control_word = 0x000F;
        }
    });

    let outcome = fx.control.step(0.0).unwrap();
    assert_eq!(outcome, CycleOutcome::Completed { operational: true });
    for record in fx.records() {
        assert_eq!(record.control_word, 0x000F);
    }
}
