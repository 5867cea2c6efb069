//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use stepper_sdk::prelude::*;
//! ```

// 驱动层
pub use crate::driver::{
    ActuatorBuilder, ActuatorDriver, ActuatorKind, ActuatorRegistry, ActuatorSnapshot,
    Completion, DriverConfig, MoveReport, MoveTarget, TravelLimits,
};

// 外部协作者（Trait 与常用实现）
pub use crate::serial::{SerialAdapter, SerialConfig, SerialPortAdapter};
pub use crate::tools::{
    ActuatorProfile, FileRecoveryLog, PositionRecoveryLog, PowerRelay, ProfileSet, ScriptRelay,
};

// 状态解码
pub use crate::protocol::{AlarmReport, StatusFlags};

// 错误类型
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::serial::SerialError;
pub use crate::tools::RelayError;
