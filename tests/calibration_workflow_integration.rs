//! Integration tests for the calibration workflow
//!
//! These tests run the calibration engine against the file-backed stores,
//! with separate `Instrument` instances standing in for separate processes.

mod common;

use common::assert_float_eq;
use common::builders::{fast_config, RecordBuilder, SampleSetBuilder};
use common::mock_helpers::{create_test_adc, wait_for_event};
use common::test_timeout;
use gascal_rs::backend::{AcquisitionEvent, AcquisitionService};
use gascal_rs::calibration::{CommitOutcome, Decision, Diagnostic};
use gascal_rs::config::{AppConfig, LEDGER_FILE};
use gascal_rs::store::CalibrationLedger;
use gascal_rs::types::CalibrationStatus;
use gascal_rs::{GasCalError, Instrument};
use std::io::Write;
use std::thread;

#[test]
fn test_calibrate_against_running_acquisition() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    let acquisition = Instrument::open(config.clone()).unwrap();
    let (adc, _control) = create_test_adc();

    let (service, handle) = AcquisitionService::new(config.clone(), Box::new(adc), acquisition.store());
    let worker = thread::spawn(move || service.run());
    assert!(wait_for_event(&handle, test_timeout(), |e| {
        matches!(e, AcquisitionEvent::Published(_))
    })
    .is_some());

    // Operator terminal
    let terminal = Instrument::open(config.clone()).unwrap();
    let proposal = terminal.request_calibration(20.9).unwrap();
    assert!(!proposal.has_errors());
    assert_float_eq(proposal.gains().gain(0), 20.9 / 500.0, 1e-12);
    assert_float_eq(proposal.gains().gain(3), 20.9 / 418.0, 1e-12);

    let outcome = terminal.decide(&proposal, Decision::Accept).unwrap();
    assert!(matches!(outcome, CommitOutcome::Accepted(_)));

    // A dashboard opened independently sees the new calibration immediately
    let dashboard = Instrument::open(config).unwrap();
    let readout = dashboard.readout().unwrap().unwrap();
    assert_float_eq(readout.row(0).unwrap().concentration_pct.unwrap(), 20.9, 1e-9);
    assert_float_eq(readout.row(3).unwrap().concentration_pct.unwrap(), 20.9, 1e-9);

    handle.shutdown();
    worker.join().unwrap().unwrap();
}

#[test]
fn test_stale_sample_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = Instrument::open_in(AppConfig::default(), dir.path());
    instrument
        .store()
        .publish(
            &SampleSetBuilder::new()
                .aged(chrono::Duration::minutes(5))
                .channel(0, 500.0)
                .channel(3, 418.0)
                .build(),
        )
        .unwrap();

    let err = instrument.request_calibration(20.9).unwrap_err();
    assert!(matches!(err, GasCalError::StaleSample { .. }));
    assert!(instrument.history().unwrap().is_empty());
    assert!(!dir.path().join(LEDGER_FILE).exists());
}

#[test]
fn test_request_applied_once_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let first = Instrument::open_in(AppConfig::default(), dir.path());
    let second = Instrument::open_in(AppConfig::default(), dir.path());
    first
        .store()
        .publish(&SampleSetBuilder::new().channel(0, 500.0).channel(3, 418.0).build())
        .unwrap();

    let proposal = first.request_calibration(20.9).unwrap();
    assert!(matches!(
        first.decide(&proposal, Decision::Accept).unwrap(),
        CommitOutcome::Accepted(_)
    ));

    // The same request delivered to another instance
    assert_eq!(
        second.decide(&proposal, Decision::Accept).unwrap(),
        CommitOutcome::AlreadyApplied
    );
    assert_eq!(second.history().unwrap().len(), 1);
}

#[test]
fn test_declined_calibration_is_kept_but_not_applied() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = Instrument::open_in(AppConfig::default(), dir.path());
    instrument
        .store()
        .publish(&SampleSetBuilder::new().channel(0, 500.0).channel(3, 418.0).build())
        .unwrap();

    let accepted = instrument.request_calibration(20.9).unwrap();
    instrument.decide(&accepted, Decision::Accept).unwrap();

    instrument
        .store()
        .publish(&SampleSetBuilder::new().channel(0, 250.0).channel(3, 418.0).build())
        .unwrap();
    let declined = instrument.request_calibration(20.9).unwrap();

    // Channel 0 doubled its gain
    let drift = declined.diagnostics().find(|(channel, d)| {
        *channel == 0 && matches!(d, Diagnostic::Drift { .. })
    });
    assert!(drift.is_some());

    instrument.decide(&declined, Decision::Decline).unwrap();

    let history = instrument.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, CalibrationStatus::Rejected);
    assert_eq!(history[1].request_id, Some(declined.request.id));
    assert_float_eq(
        instrument.current_calibration().unwrap().gain(0),
        20.9 / 500.0,
        1e-12,
    );
}

#[test]
fn test_ledger_written_by_another_process_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CalibrationLedger::open(dir.path().join(LEDGER_FILE));
    ledger
        .append(&RecordBuilder::accepted().gain(0, 0.040).gain(3, 0.050).build())
        .unwrap();
    ledger
        .append(&RecordBuilder::rejected().gain(0, 0.090).gain(3, 0.090).build())
        .unwrap();
    ledger
        .append(&RecordBuilder::accepted().gain(0, 0.042).gain(3, 0.048).build())
        .unwrap();

    // Crash in the middle of a fourth append
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(ledger.path())
        .unwrap();
    file.write_all(b"{\"timestamp\":\"2025-").unwrap();
    drop(file);

    let instrument = Instrument::open_in(AppConfig::default(), dir.path());
    let gains = instrument.current_calibration().unwrap();
    assert_eq!(gains.gain(0), 0.042);
    assert_eq!(gains.gain(3), 0.048);
    assert_eq!(instrument.history().unwrap().len(), 3);
}

#[test]
fn test_zero_and_low_signal_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let instrument = Instrument::open_in(AppConfig::default(), dir.path());
    instrument
        .store()
        .publish(&SampleSetBuilder::new().channel(0, 0.0).channel(3, 0.7315).build())
        .unwrap();

    let proposal = instrument.request_calibration(20.9).unwrap();
    assert!(proposal.has_errors());

    let ch0 = &proposal.channels[0];
    assert_eq!(ch0.new_gain, 1.0);
    assert_eq!(ch0.diagnostics, vec![Diagnostic::ZeroSignal]);

    // 20.9 / 0.7315 mV puts 100% at 3.5 mV
    let ch3 = &proposal.channels[1];
    assert!(matches!(ch3.diagnostics[0], Diagnostic::LowSignalError { .. }));

    let text = proposal.report_lines().join("\n");
    assert!(text.contains("Sensor needs replacement"));
}
