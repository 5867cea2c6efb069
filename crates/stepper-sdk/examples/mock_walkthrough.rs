//! 模拟设备演示
//!
//! 不需要硬件：旋转轴与直线轴都连接到 `MockDevice`，依次执行首次启动、
//! 运动、越限拒绝、直线轴回零，最后打印状态表与恢复日志内容。
//!
//! ```bash
//! cargo run -p stepper-sdk --features mock --example mock_walkthrough
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use stepper_sdk::prelude::*;
use stepper_sdk::serial::MockDevice;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mock_walkthrough")]
struct Args {
    /// 旋转轴目标角度
    #[arg(long, default_value_t = 30.0)]
    angle: f64,

    /// 直线轴物理行程（mm）
    #[arg(long, default_value_t = 50.0)]
    span: f64,

    /// 每次运动后 SC 报告"运动中"的次数
    #[arg(long, default_value_t = 2)]
    moving_polls: u32,

    /// 以 JSON 输出状态
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    stepper_sdk::init_tracing("stepper_driver=info");
    let args = Args::parse();
    let dir = tempfile::tempdir().context("Failed to create scratch directory")?;

    let config = DriverConfig {
        power_cycle_delay_ms: 10,
        ..Default::default()
    };

    let tilt_device = MockDevice::new();
    tilt_device.set_moving_polls(args.moving_polls);
    let (tilt, report) = ActuatorBuilder::rotational("tilt")
        .config(config.clone())
        .transport(Box::new(tilt_device.adapter("/dev/mock-tilt")))
        .log_file(dir.path().join("tilt.log"))?
        .start()?;
    info!(?report.first_boot_error, booted = report.booted, "tilt started");

    let slide_device = MockDevice::new();
    slide_device.set_moving_polls(args.moving_polls);
    slide_device.set_travel_limits(-4_000, (args.span * 400.0) as i64 - 4_000);
    let (slide, _) = ActuatorBuilder::linear("slide")
        .config(config)
        .transport(Box::new(slide_device.adapter("/dev/mock-slide")))
        .log_file(dir.path().join("slide.log"))?
        .start()?;

    let mut registry = ActuatorRegistry::new();
    registry.insert(tilt)?;
    registry.insert(slide)?;

    let tilt = registry.select("tilt")?;
    let moved = tilt.move_absolute(args.angle)?;
    info!(
        steps = moved.steps,
        error = moved.quantization_error,
        "tilt reached {}",
        args.angle
    );
    if let Err(e) = tilt.move_relative(120.0) {
        warn!("Rejected as expected: {}", e);
    }

    let slide = registry.select("slide")?;
    let homing = slide.home(args.span)?;
    info!(
        travel = homing.travel_steps,
        steps_per_mm = homing.steps_per_mm,
        limits = %homing.limits,
        "slide homed"
    );
    slide.move_to("IN".parse().map_err(anyhow::Error::msg)?)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&registry.snapshots())?);
    } else {
        println!("{}", registry.status_table());
    }

    for name in ["tilt", "slide"] {
        let log = std::fs::read_to_string(dir.path().join(format!("{}.log", name)))?;
        println!("\n{}.log:\n{}", name, log.trim_end());
    }
    Ok(())
}
