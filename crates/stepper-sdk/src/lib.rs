//! Stepper SDK - SCL 步进执行器 Rust SDK
//!
//! 通过串口驱动 SCL 文本协议的步进驱动器，管理旋转轴（角度，经减速器）
//! 与直线轴（毫米，带限位开关回零），并在断电后从恢复日志中恢复位置。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 命令编码、应答解析、状态/报警寄存器解码、细分表
//! - **串口层** (`serial`): 串口抽象、serialport 后端、模拟设备（`mock` feature）
//! - **工具层** (`tools`): 恢复日志、电源继电器、执行器配置文件
//! - **驱动层** (`driver`): 执行器状态机
//!
//! # 快速开始
//!
//! ```no_run
//! use stepper_sdk::prelude::*;
//!
//! stepper_sdk::init_tracing("stepper_driver=info");
//!
//! let (mut tilt, _report) = ActuatorBuilder::rotational("tilt")
//!     .port("/dev/ttyUSB0")
//!     .log_file("/home/user/stepper/tilt.log")?
//!     .start()?;
//! tilt.move_absolute(30.0)?;
//! # Ok::<(), DriverError>(())
//! ```

pub use stepper_driver as driver;
pub use stepper_protocol as protocol;
pub use stepper_serial as serial;
pub use stepper_tools as tools;

pub mod prelude;

pub use driver::{
    ActuatorBuilder, ActuatorDriver, ActuatorKind, ActuatorRegistry, DriverConfig, DriverError,
    MoveTarget,
};
pub use protocol::ProtocolError;
pub use serial::{SerialAdapter, SerialError};

use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// 使用 `RUST_LOG` 环境变量，并追加 `default_directive`（如 `"stepper_driver=info"`）。
/// 已经安装过订阅者时不做任何事，返回 false。
pub fn init_tracing(default_directive: &str) -> bool {
    let mut filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log directive {:?}: {}", default_directive, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("stepper_driver=debug");
        assert!(!init_tracing("stepper_driver=info"));
    }
}
