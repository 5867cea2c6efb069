//! 执行器控制台示例
//!
//! 读取 `~/stepper/stepper.toml`（不存在时写出模板），按配置启动每个执行器，
//! 执行一个可选动作后打印状态表。
//!
//! ```bash
//! cargo run -p stepper-sdk --example actuator_console -- status
//! cargo run -p stepper-sdk --example actuator_console -- move tilt 30
//! cargo run -p stepper-sdk --example actuator_console -- calibrate slide 50
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stepper_sdk::prelude::*;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "actuator_console")]
#[command(about = "Drive SCL stepper actuators listed in a profile file", long_about = None)]
struct Cli {
    /// 配置文件路径（默认 ~/stepper/stepper.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 继电器脚本目录
    #[arg(long, default_value = ".")]
    scripts: PathBuf,

    /// 不检查串口路径是否存在
    #[arg(long)]
    skip_port_check: bool,

    /// 以 JSON 输出状态
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// 打印状态表
    Status,
    /// 运动到 IN / OUT 或绝对位置
    Move {
        name: String,
        #[arg(allow_hyphen_values = true)]
        target: MoveTarget,
    },
    /// 相对运动
    Step {
        name: String,
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },
    /// 标定（旋转轴：当前角度；直线轴：物理行程 mm）
    Calibrate { name: String, value: f64 },
    /// 设置细分
    Resolution { name: String, steps_per_rev: u32 },
    /// 设置软件限位
    Limits {
        name: String,
        #[arg(allow_hyphen_values = true)]
        low: f64,
        #[arg(allow_hyphen_values = true)]
        high: f64,
    },
    /// 读取状态与报警寄存器
    Alarm { name: String },
    /// 关闭串口并断电
    Off { name: String },
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    let home = std::env::var_os("HOME").context("HOME is not set, pass --config")?;
    Ok(ProfileSet::default_path(&PathBuf::from(home)))
}

fn run_action(registry: &mut ActuatorRegistry, action: Action) -> Result<()> {
    match action {
        Action::Status => {},
        Action::Move { name, target } => {
            let report = registry.select(&name)?.move_to(target)?;
            info!(steps = report.steps, "Moved {} to {}", name, target);
        },
        Action::Step { name, delta } => {
            registry.select(&name)?.move_relative(delta)?;
        },
        Action::Calibrate { name, value } => {
            registry.select(&name)?.calibrate(value)?;
        },
        Action::Resolution {
            name,
            steps_per_rev,
        } => {
            let resolution = registry.select(&name)?.set_resolution(steps_per_rev)?;
            info!("{} now runs at {} steps/rev", name, resolution.steps_per_rev);
        },
        Action::Limits { name, low, high } => {
            registry.select(&name)?.set_limits(low, high)?;
        },
        Action::Alarm { name } => {
            let driver = registry.select(&name)?;
            let status = driver.get_status()?;
            let alarm = driver.get_alarm()?;
            println!("status {}", status.bit_string());
            println!("alarm  {:?}", alarm);
        },
        Action::Off { name } => {
            registry.select(&name)?.shutdown()?;
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    stepper_sdk::init_tracing("stepper_driver=info");
    let cli = Cli::parse();

    let path = config_path(&cli)?;
    let profiles = ProfileSet::load_or_create_template(&path, !cli.skip_port_check)
        .with_context(|| format!("Failed to load actuator profiles from {}", path.display()))?;
    let log_dir = path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut registry = ActuatorRegistry::new();
    for profile in &profiles.actuators {
        let builder = ActuatorBuilder::from_profile(profile, &log_dir, &cli.scripts)
            .with_context(|| format!("Failed to prepare actuator {}", profile.name))?;
        let (driver, report) = builder.start()?;
        if let Some(e) = &report.first_boot_error {
            warn!(actuator = %profile.name, "First boot failed: {}", e);
        }
        if !report.booted {
            warn!(actuator = %profile.name, "Actuator is not responding");
        }
        registry.insert(driver)?;
    }
    if registry.is_empty() {
        bail!("No actuators configured in {}", path.display());
    }

    if let Some(action) = cli.action {
        run_action(&mut registry, action)?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&registry.snapshots())?);
    } else {
        println!("{}", registry.status_table());
    }
    Ok(())
}
