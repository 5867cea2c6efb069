//! 驱动状态机集成测试
//!
//! 使用 `stepper-serial` 的模拟设备（`mock` feature），无需硬件。
//! 模拟设备记录收到的每一条命令，测试据此检查命令顺序与"拒绝时无写入"。

use stepper_driver::{
    ActuatorBuilder, ActuatorDriver, BootStage, Completion, ConnectionState, DriverConfig,
    DriverError, LoadOutcome, MAX_DEVICE_STEPS, MoveTarget, PersistedRecord, TravelLimits,
};
use stepper_protocol::{AlarmCode, AlarmReport, StatusFlag};
use stepper_serial::MockDevice;
use stepper_tools::{FileRecoveryLog, MemoryRecoveryLog, MemoryRelay, PositionRecoveryLog};
use tracing_subscriber::EnvFilter;

const PORT: &str = "/dev/ttyUSB0";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> DriverConfig {
    DriverConfig {
        power_cycle_delay_ms: 0,
        mode_key_delay_ms: 2,
        read_timeout_ms: 50,
        ..Default::default()
    }
}

fn rotational(device: &MockDevice, log: MemoryRecoveryLog) -> ActuatorDriver {
    init_tracing();
    ActuatorBuilder::rotational("tilt")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .log(Box::new(log))
        .relay(Box::new(MemoryRelay::new()))
        .build()
        .unwrap()
}

fn linear(device: &MockDevice) -> ActuatorDriver {
    linear_with_log(device, MemoryRecoveryLog::new())
}

fn linear_with_log(device: &MockDevice, log: MemoryRecoveryLog) -> ActuatorDriver {
    init_tracing();
    ActuatorBuilder::linear("slide")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .log(Box::new(log))
        .build()
        .unwrap()
}

/// 连接并从日志恢复，之后清空命令记录
fn connected(driver: &mut ActuatorDriver, device: &MockDevice) {
    assert!(driver.check_connect());
    driver.load_from_log().unwrap();
    device.clear_commands();
}

fn record_at(angle: f64, steps: i64) -> String {
    format!(
        "2025-01-20/10:00:00+0000, {:.5}, {}, 2000, 0.00000, {}, 0.00000, 90.00000, {}",
        angle, steps, steps, PORT
    )
}

// ----------------------------------------------------------------------
// 连接检查
// ----------------------------------------------------------------------

#[test]
fn test_check_connect_requires_exact_echo() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    assert!(driver.check_connect());
    assert!(driver.is_booted());
    assert!(driver.connection().is_connected());

    device.set_probe_reply("FOOBAR");
    assert!(!driver.check_connect());
    assert!(!driver.is_booted());
    assert_eq!(driver.connection(), ConnectionState::Disconnected);
}

#[test]
fn test_check_connect_silent_device() {
    let device = MockDevice::new();
    device.set_responsive(false);
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    assert!(!driver.check_connect());
    assert!(matches!(
        driver.probe(),
        Err(DriverError::ProbeMismatch { reply }) if reply.is_empty()
    ));
}

// ----------------------------------------------------------------------
// 日志恢复
// ----------------------------------------------------------------------

#[test]
fn test_empty_log_uses_default_resolution() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    assert!(driver.check_connect());

    assert_eq!(driver.load_from_log().unwrap(), LoadOutcome::Defaulted);
    assert_eq!(driver.steps_per_rev(), 2000);
    assert_eq!(driver.position_steps(), 0);
    assert!(device.received("SP0"));
    assert!(device.received("MR3"));
    assert_eq!(device.resolution_index(), Some(3));
}

#[test]
fn test_empty_log_unprobed_keeps_device_counter() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    // 未探测：不把计数器写回设备
    driver.load_from_log().unwrap();
    assert!(!device.received("SP0"));
}

#[test]
fn test_restore_from_last_record() {
    let device = MockDevice::new();
    let log = MemoryRecoveryLog::with_records([
        record_at(10.0, 200),
        "2025-01-20/10:00:00+0000,45.00000,900,2000,0.0,900,0.0,90.0,/dev/ttyUSB0".to_string(),
    ]);
    let mut driver = rotational(&device, log);
    assert!(driver.check_connect());

    let outcome = driver.load_from_log().unwrap();
    assert!(matches!(outcome, LoadOutcome::Restored(ref r) if r.position == 45.0));
    assert_eq!(driver.position(), 45.0);
    assert_eq!(driver.position_steps(), 900);
    assert_eq!(driver.steps_per_rev(), 2000);
    assert_eq!(driver.limits(), TravelLimits::new(0.0, 90.0));
    assert!(device.received("SP900"));
    assert_eq!(device.position(), 900);
}

#[test]
fn test_restore_linear_record_drives_next_move() {
    let device = MockDevice::new();
    let log = MemoryRecoveryLog::with_records([format!(
        "2025-01-20/10:00:00+0000, 30.00000, 30937, 5000, 1031.25000, -0.00048, 19200, 2.00000, 48.00000, {}",
        PORT
    )]);
    let mut driver = linear_with_log(&device, log);
    assert!(driver.check_connect());

    let outcome = driver.load_from_log().unwrap();
    assert!(matches!(outcome, LoadOutcome::Restored(ref r) if r.steps_per_mm == Some(1031.25)));
    // 日志中的每毫米步数覆盖细分切换时的换算
    assert_eq!(driver.state().steps_per_mm, 1031.25);
    assert_eq!(driver.steps_per_rev(), 5000);
    assert_eq!(driver.position(), 30.0);
    assert_eq!(driver.position_steps(), 30937);
    assert_eq!(driver.limits(), TravelLimits::new(2.0, 48.0));
    assert!(device.received("MR4"));
    assert_eq!(device.position(), 30937);
    device.clear_commands();

    let report = driver.move_absolute(40.0).unwrap();
    assert_eq!(report.steps, 10312);
    assert!(device.received("VE0.5"));
    assert!(device.received("FL10312"));
    assert_eq!(driver.position_steps(), 41249);
    assert_eq!(device.position(), 41249);

    assert!(matches!(
        driver.move_absolute(48.5),
        Err(DriverError::OutOfRange { .. })
    ));
    driver.move_to(MoveTarget::In).unwrap();
    assert_eq!(driver.position(), 2.0);
    assert_eq!(device.position(), driver.position_steps());
}

#[test]
fn test_corrupt_record_is_an_error() {
    let device = MockDevice::new();
    let log = MemoryRecoveryLog::with_records(["2025-01-20/10:00:00+0000, 45.0, 900"]);
    let mut driver = rotational(&device, log);
    assert!(matches!(
        driver.load_from_log(),
        Err(DriverError::Record(_))
    ));
}

// ----------------------------------------------------------------------
// 运动
// ----------------------------------------------------------------------

#[test]
fn test_out_of_range_move_sends_nothing() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::with_records([record_at(85.0, 6611)]));
    connected(&mut driver, &device);

    let result = driver.move_relative(10.0);
    assert!(matches!(result, Err(DriverError::OutOfRange { .. })));
    assert!(device.commands().is_empty());
    assert_eq!(driver.position(), 85.0);
}

#[test]
fn test_move_absolute_quantizes_and_records() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tilt.log");
    let device = MockDevice::new();
    let mut driver = ActuatorBuilder::rotational("tilt")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .log_file(&path)
        .unwrap()
        .build()
        .unwrap();
    connected(&mut driver, &device);

    let report = driver.move_absolute(30.0).unwrap();
    assert_eq!(report.steps, 2333);
    assert!(matches!(report.completion, Completion::Polled { .. }));
    assert!(report.quantization_error < 0.0);
    assert_eq!(driver.position(), 30.0);
    assert_eq!(driver.position_steps(), 2333);
    assert_eq!(device.position(), 2333);

    let commands = device.commands();
    let ve = commands.iter().position(|c| c == "VE1").unwrap();
    let fl = commands.iter().position(|c| c == "FL2333").unwrap();
    assert!(ve < fl);

    let log = FileRecoveryLog::open(&path).unwrap();
    assert_eq!(log.record_count(), 1);
    let record = PersistedRecord::parse(log.last().unwrap(), driver.kind()).unwrap();
    assert_eq!(record.position, 30.0);
    assert_eq!(record.position_steps, 2333);
    assert_eq!(record.previous_move_steps, 2333);
    assert_eq!(record.port, PORT);
}

#[test]
fn test_accumulated_error_tracks_quantization() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    let first = driver.move_absolute(30.0).unwrap();
    let second = driver.move_relative(-15.0).unwrap();
    let expected = first.quantization_error + second.quantization_error;
    assert!((driver.state().accumulated_error - expected).abs() < 1e-12);
    assert_eq!(driver.position(), 15.0);
    assert_eq!(driver.position_steps(), first.steps + second.steps);
    assert_eq!(device.position(), driver.position_steps());
}

#[test]
fn test_move_waits_while_moving() {
    let device = MockDevice::new();
    device.set_moving_polls(3);
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    let report = driver.move_absolute(10.0).unwrap();
    assert_eq!(report.completion, Completion::Polled { polls: 4 });
    assert!(driver.connection().is_connected());
}

#[test]
fn test_position_mismatch_blocks_motion() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    device.set_position(5);

    assert!(matches!(
        driver.move_absolute(10.0),
        Err(DriverError::PositionMismatch {
            expected: 0,
            actual: 5
        })
    ));
    assert!(!device.received_prefix("FL"));
    assert!(!driver.validate_position().unwrap());
}

#[test]
fn test_disabled_motor_blocks_motion() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    device.set_enabled(false);

    assert!(matches!(
        driver.move_absolute(10.0),
        Err(DriverError::MotorDisabled)
    ));
    assert!(!device.received_prefix("FL"));
    assert!(!driver.is_enabled());
}

#[test]
fn test_binary_status_falls_back_to_timed_wait() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    // 运动前检查（SP、SC）正常，第一次运动轮询收到乱码
    device.inject_reply("SP=0\r");
    device.inject_reply("SC=1\r");
    device.inject_reply(vec![0xff, 0xfe, 0x00]);

    let report = driver.move_absolute(1.0).unwrap();
    assert_eq!(report.steps, 77);
    assert!(matches!(report.completion, Completion::TimedFallback { .. }));
    assert_eq!(driver.position(), 1.0);
    assert_eq!(driver.position_steps(), 77);
}

#[test]
fn test_garbled_status_text_falls_back_to_timed_wait() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    device.inject_reply("SP=0\r");
    device.inject_reply("SC=1\r");
    device.inject_reply("SC=??\r");

    let report = driver.move_absolute(1.0).unwrap();
    assert!(matches!(report.completion, Completion::TimedFallback { .. }));
}

#[test]
fn test_equal_limits_disable_range_check() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    driver.set_limits(10.0, 10.0).unwrap();
    driver.move_absolute(400.0).unwrap();
    assert_eq!(driver.position(), 400.0);
}

#[test]
fn test_unbounded_move_beyond_drive_range_rejected() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    driver.set_limits(0.0, 0.0).unwrap();
    device.clear_commands();

    assert!(matches!(
        driver.move_absolute(1e30),
        Err(DriverError::InvalidArgument(_))
    ));
    assert!(device.commands().is_empty());
    assert_eq!(driver.position(), 0.0);
    assert_eq!(driver.position_steps(), 0);

    let report = driver.move_absolute(30.0).unwrap();
    assert_eq!(report.steps, 2333);
    assert_eq!(device.position(), driver.position_steps());
}

#[test]
fn test_move_past_drive_counter_limit_rejected() {
    let device = MockDevice::new();
    let near_max = MAX_DEVICE_STEPS - 1000;
    let mut driver = rotational(
        &device,
        MemoryRecoveryLog::with_records([record_at(10.0, near_max)]),
    );
    connected(&mut driver, &device);
    assert_eq!(device.position(), near_max);
    driver.set_limits(0.0, 0.0).unwrap();
    device.clear_commands();

    assert!(matches!(
        driver.move_relative(360.0),
        Err(DriverError::InvalidArgument(_))
    ));
    assert!(device.commands().is_empty());
    assert_eq!(driver.position_steps(), near_max);
    assert_eq!(driver.position(), 10.0);
}

#[test]
fn test_move_in_out_on_rotational_rejected() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    assert!(matches!(
        driver.move_to("OUT".parse::<MoveTarget>().unwrap()),
        Err(DriverError::UnsupportedForKind { .. })
    ));
    assert!(device.commands().is_empty());
}

// ----------------------------------------------------------------------
// 首次启动
// ----------------------------------------------------------------------

#[test]
fn test_first_boot_command_order() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    driver.first_boot().unwrap();

    assert!(device.scl_mode());
    assert_eq!(
        device.commands(),
        vec![
            "00", "SSFOO", "PM2", "DL3", "PR1", "IFD", "CM21", "AC10", "DE10", "SA", "SP0",
            "SSFOO"
        ]
    );
    assert!(driver.is_booted());
    assert_eq!(driver.position_steps(), 0);
}

#[test]
fn test_first_boot_linear_limit_code() {
    let device = MockDevice::new();
    let mut driver = linear(&device);
    driver.first_boot().unwrap();
    assert!(device.received("DL1"));
    assert!(!device.received("DL3"));
}

#[test]
fn test_first_boot_relay_failure_names_stage() {
    init_tracing();
    let device = MockDevice::new();
    let mut driver = ActuatorBuilder::rotational("tilt")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .relay(Box::new(MemoryRelay::failing()))
        .build()
        .unwrap();

    let err = driver.first_boot().unwrap_err();
    assert!(matches!(
        err,
        DriverError::Boot {
            stage: BootStage::PowerOff,
            ..
        }
    ));
    assert!(err.to_string().contains("relay"));
    assert!(device.commands().is_empty());
}

#[test]
fn test_first_boot_without_scl_echo_stops_at_probe() {
    let device = MockDevice::new();
    device.set_probe_reply("?");
    let mut driver = rotational(&device, MemoryRecoveryLog::new());

    let err = driver.first_boot().unwrap_err();
    assert!(matches!(
        err,
        DriverError::Boot {
            stage: BootStage::Probe,
            ..
        }
    ));
    assert!(!device.received("PM2"));
}

#[test]
fn test_startup_on_fresh_log() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tilt.log");
    let device = MockDevice::new();
    let builder = ActuatorBuilder::rotational("tilt")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .log_file(&path)
        .unwrap();
    assert!(builder.is_fresh_log());

    let (driver, report) = builder.start().unwrap();
    assert!(report.first_boot_attempted);
    assert!(report.first_boot_error.is_none());
    assert!(report.booted);
    assert!(!report.restored);
    assert_eq!(report.motor_enabled, Some(true));
    assert!(driver.is_booted());

    let log = FileRecoveryLog::open(&path).unwrap();
    assert!(log.has_header());
    assert_eq!(log.record_count(), 0);
    assert!(!log.was_created());
}

#[test]
fn test_startup_restores_existing_log() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tilt.log");
    std::fs::write(
        &path,
        format!(
            "{}\n{}\n",
            PersistedRecord::header(stepper_driver::ActuatorKind::Rotational),
            record_at(45.0, 3500)
        ),
    )
    .unwrap();

    let device = MockDevice::new();
    let (driver, report) = ActuatorBuilder::rotational("tilt")
        .config(test_config())
        .transport(Box::new(device.adapter(PORT)))
        .log_file(&path)
        .unwrap()
        .start()
        .unwrap();

    assert!(!report.first_boot_attempted);
    assert!(report.restored);
    assert!(!device.scl_mode());
    assert_eq!(driver.position(), 45.0);
    assert_eq!(device.position(), 3500);
}

// ----------------------------------------------------------------------
// 标定、细分、状态
// ----------------------------------------------------------------------

#[test]
fn test_rotational_calibrate() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    device.set_position(1234);

    driver.calibrate(45.0).unwrap();
    assert_eq!(driver.position(), 45.0);
    assert_eq!(driver.position_steps(), 0);
    assert_eq!(device.position(), 0);

    assert!(matches!(
        driver.calibrate(120.0),
        Err(DriverError::OutOfRange { .. })
    ));
    assert_eq!(driver.position(), 45.0);
}

#[test]
fn test_linear_homing() {
    let device = MockDevice::new();
    device.set_travel_limits(-5_000, 15_000);
    let mut driver = linear(&device);
    connected(&mut driver, &device);

    let report = driver.home(50.0).unwrap();
    assert_eq!(report.travel_steps, 20_000);
    assert_eq!(report.steps_per_mm, 400.0);
    assert_eq!(report.limits, TravelLimits::new(2.0, 48.0));
    assert_eq!(report.parked.steps, -800);

    assert!(device.received("FL-1000000"));
    assert!(device.received("FL1000000"));
    assert!(device.received("VE0.5"));
    assert_eq!(device.alarm(), 0);
    assert_eq!(driver.position(), 48.0);
    assert_eq!(driver.position_steps(), 19_200);
    assert_eq!(device.position(), 19_200);

    driver.move_to(MoveTarget::In).unwrap();
    assert_eq!(driver.position(), 2.0);
    assert_eq!(device.position(), 800);
}

#[test]
fn test_linear_calibrate_rejects_short_span() {
    let device = MockDevice::new();
    let mut driver = linear(&device);
    connected(&mut driver, &device);
    assert!(matches!(
        driver.calibrate(4.0),
        Err(DriverError::InvalidArgument(_))
    ));
    assert!(device.commands().is_empty());
}

#[test]
fn test_set_resolution_sends_index() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    let resolution = driver.set_resolution(12_000).unwrap();
    assert_eq!(resolution.steps_per_rev, 12_800);
    assert_eq!(device.resolution_index(), Some(6));

    // 下标 2（1000）被替换为下标 3
    driver.set_resolution(1000).unwrap();
    assert_eq!(device.resolution_index(), Some(3));
    assert_eq!(driver.steps_per_rev(), 2000);
}

#[test]
fn test_status_and_alarm_reports() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    assert_eq!(driver.get_alarm().unwrap(), AlarmReport::NoAlarm);

    device.set_alarm((1 << 1) | (1 << 2));
    let status = driver.get_status().unwrap();
    assert!(status.is_enabled());
    assert!(status.contains(StatusFlag::AlarmPresent));
    assert!(!status.is_moving());

    match driver.get_alarm().unwrap() {
        AlarmReport::Active {
            codes,
            unrecognized_bits,
        } => {
            assert_eq!(codes, vec![AlarmCode::CwLimit, AlarmCode::CcwLimit]);
            assert_eq!(unrecognized_bits, 0);
        },
        AlarmReport::NoAlarm => panic!("alarm expected"),
    }

    driver.clear_alarm().unwrap();
    assert_eq!(device.alarm(), 0);
}

#[test]
fn test_motor_enable_and_raw_passthrough() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    driver.motor_enable(false).unwrap();
    assert!(!driver.is_motor_on().unwrap());
    driver.motor_enable(true).unwrap();
    assert!(driver.is_motor_on().unwrap());
    assert_eq!(
        driver.connection(),
        ConnectionState::Connected { enabled: true }
    );

    driver.send_raw(" SP77 ").unwrap();
    assert_eq!(driver.query_position_steps().unwrap(), 77);
    let reply = driver.query_raw("SP").unwrap();
    assert_eq!(reply.trimmed(), Some("SP=77"));
    // 没有待读数据时返回空应答
    assert!(driver.read_pending().unwrap().is_empty());
}

#[test]
fn test_serial_failure_is_reported() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);
    device.set_io_failure(true);

    assert!(matches!(
        driver.move_absolute(10.0),
        Err(DriverError::Serial(_))
    ));
    assert!(!driver.check_connect());
}

#[test]
fn test_replace_transport_and_shutdown() {
    let device = MockDevice::new();
    let mut driver = rotational(&device, MemoryRecoveryLog::new());
    connected(&mut driver, &device);

    let other = MockDevice::new();
    driver.replace_transport(Box::new(other.adapter("/dev/ttyUSB1")));
    assert_eq!(driver.port(), "/dev/ttyUSB1");
    assert!(!driver.is_booted());
    assert!(driver.check_connect());
    assert!(other.received("SSFOO"));

    driver.make_log_entry().unwrap();
    assert_eq!(driver.record().port, "/dev/ttyUSB1");

    driver.shutdown().unwrap();
    assert!(!driver.has_transport());
    assert!(!driver.power_status().unwrap());
    assert!(matches!(
        driver.query_position_steps(),
        Err(DriverError::NotConnected(_))
    ));
}
