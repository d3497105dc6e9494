//! Tests for the detection / configuration / measurement sequences

mod common;

use std::time::Duration;

use common::*;
use mti_lib::{FirmwareRevision, OutputConfiguration};

fn driver(sim: SimulatedMti) -> Mti<SimulatedMti, FakeClock> {
    Mti::new(engine(sim), FakeClock::default())
}

#[test]
fn detect_succeeds_on_first_ack() {
    init_tracing();
    let mut mti = driver(SimulatedMti::new("MTi-1-8A7G6"));

    mti.detect(Duration::from_secs(5)).expect("device answers");
    assert!(mti.state().config_state);

    let (xbus, clock) = mti.into_parts();
    assert_eq!(clock.sleeps, 1);
    assert_eq!(xbus.into_transport().sent_ids(), vec![0x30]);
}

#[test]
fn detect_times_out_on_silent_device() {
    let mut mti = driver(SimulatedMti::silent());

    let err = mti.detect(Duration::from_secs(5)).unwrap_err();
    assert_eq!(
        err,
        XbusError::ProtocolTimeout {
            operation: "device detection",
            waited: Duration::from_secs(5)
        }
    );
    assert!(!mti.state().config_state);

    // one GoToConfig per 250 ms poll interval
    let sent = mti.xbus_mut().transport_mut().sent_ids();
    assert_eq!(sent.len(), 20);
    assert!(sent.iter().all(|mid| *mid == 0x30));
}

#[test]
fn detect_times_out_when_nothing_is_on_the_bus() {
    let sim = SimulatedMti::new("MTi-1-8A7G6");
    let xbus = Xbus::with_config(sim, XbusConfig::default().with_address(0x6A));
    let mut mti = Mti::new(xbus, FakeClock::default());

    let err = mti.detect(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, XbusError::ProtocolTimeout { .. }));
}

#[test]
fn full_start_sequence_for_mti_1() {
    let mut mti = driver(SimulatedMti::new("MTi-1-8A7G6"));

    let outputs = mti.start().expect("start sequence");
    assert_eq!(outputs, OutputConfiguration::for_family(DeviceFamily::Imu, 1));

    let state = mti.state().clone();
    assert!(!state.config_state);
    assert_eq!(state.product_code, Some('1'));
    assert_eq!(state.product_text.as_deref(), Some("MTi-1-8A7G6"));
    assert_eq!(
        state.firmware,
        Some(FirmwareRevision {
            major: 1,
            minor: 8,
            patch: 2
        })
    );

    let sim = mti.xbus_mut().transport_mut();
    assert_eq!(sim.sent_ids(), vec![0x30, 0x1C, 0x12, 0xC0, 0x10]);
    assert_eq!(sim.commands[3], outputs.to_frame().unwrap().to_vec());
    assert!(!sim.config_mode);

    // one detect poll plus the settle delay after configuring outputs
    let (_, clock) = mti.into_parts();
    assert_eq!(clock.now, Duration::from_millis(1250));
}

#[test]
fn gnss_device_gets_position_and_orientation() {
    let config = SequencerConfig {
        output_rate_hz: 10,
        ..SequencerConfig::default()
    };
    let mut mti = Mti::with_config(engine(SimulatedMti::new("MTi-8-8A1G6")), FakeClock::default(), config);

    let outputs = mti.start().unwrap();
    assert_eq!(
        outputs.to_payload().as_ref(),
        &[0x50, 0x40, 0x00, 0x0A, 0x20, 0x30, 0x00, 0x0A]
    );

    mti.xbus_mut()
        .transport_mut()
        .push_measurement(mtdata2_packet(&[
            float_leaf(0x5040, &[48.5, 11.25]),
            float_leaf(0x2030, &[0.5, -1.0, 90.0]),
        ]));
    assert!(mti.update().unwrap());
    assert_eq!(mti.state().lat_lon, [48.5, 11.25]);
    assert_eq!(mti.state().euler_angles, [0.5, -1.0, 90.0]);
    assert!(!mti.update().unwrap());
}

#[test]
fn ack_read_before_a_failed_drain_cycle_counts() {
    let mut sim = SimulatedMti::new("MTi-1-8A7G6");
    // status and ack reads succeed, the next status read fails
    sim.fail_after = Some(2);
    let mut mti = driver(sim);

    mti.go_to_config().expect("ack was read before the bus failure");
    assert!(mti.state().config_state);

    let (_, clock) = mti.into_parts();
    assert_eq!(clock.sleeps, 0);
}

#[test]
fn product_code_from_an_interrupted_drain_is_kept() {
    let mut mti = driver(SimulatedMti::new("MTi-3-8A7G6"));
    mti.detect(Duration::from_secs(1)).unwrap();

    // idle status before the request, then status and ProductCode, then a failure
    mti.xbus_mut().transport_mut().fail_after = Some(3);
    mti.request_device_info().expect("device info");

    assert_eq!(mti.state().product_code, Some('3'));
    assert_eq!(mti.state().family(), Some(DeviceFamily::VruAhrs));
    assert!(mti.state().firmware.is_some());
    assert_eq!(mti.xbus_mut().transport_mut().sent_ids(), vec![0x30, 0x1C, 0x12]);

    let (_, clock) = mti.into_parts();
    assert_eq!(clock.sleeps, 1);
}

#[test]
fn unknown_product_code_fails_configuration() {
    let mut mti = driver(SimulatedMti::new("MTi-G-710"));
    mti.detect(Duration::from_secs(1)).unwrap();
    mti.request_device_info().unwrap();

    assert_eq!(mti.configure_outputs(), Err(XbusError::UnknownProductCode('G')));
    assert!(!mti.xbus_mut().transport_mut().sent_ids().contains(&0xC0));
}

#[test]
fn configuration_needs_a_product_code() {
    let mut mti = driver(SimulatedMti::new("MTi-3-8A7G6"));
    assert_eq!(mti.configure_outputs(), Err(XbusError::ProductCodeMissing));
    // it still switched to configuration mode first
    assert!(mti.state().config_state);
}

#[test]
fn missing_ack_times_out() {
    let mut mti = driver(SimulatedMti::silent());

    let err = mti.go_to_measurement().unwrap_err();
    assert_eq!(
        err,
        XbusError::ProtocolTimeout {
            operation: "GoToMeasurementAck",
            waited: Duration::from_secs(1)
        }
    );
}

#[test]
fn device_info_request_times_out_without_answer() {
    let mut sim = SimulatedMti::silent();
    // the device acknowledges mode changes but never sends its product code
    sim.config_mode = true;
    let mut mti = driver(sim);
    mti.xbus_mut().transport_mut().push_notification(0x31, &[]);
    mti.xbus_mut().read_messages().unwrap();

    let err = mti.request_device_info().unwrap_err();
    assert!(matches!(
        err,
        XbusError::ProtocolTimeout {
            operation: "ProductCode",
            ..
        }
    ));
}

#[test]
fn update_skips_a_failed_bus_cycle() {
    let mut mti = driver(SimulatedMti::new("MTi-1-8A7G6"));
    mti.xbus_mut().transport_mut().failing_reads = 1;
    assert!(mti.update().unwrap_err().is_transport());
    assert!(!mti.update().unwrap());
}
