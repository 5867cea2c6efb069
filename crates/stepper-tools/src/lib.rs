//! # Stepper Tools - 驱动层的外部协作者
//!
//! **依赖原则**: 不依赖 `stepper-driver`，驱动层通过 trait 使用这些实现
//!
//! ## 包含模块
//!
//! - `recovery` - 位置恢复日志（追加写入，最后一行有效）
//! - `relay` - 电源继电器（外部脚本）
//! - `profile` - 执行器配置文件（TOML）

pub mod profile;
pub mod recovery;
pub mod relay;

// 重新导出常用类型
pub use profile::{ActuatorProfile, ProfileKind, ProfileSet};
pub use recovery::{FileRecoveryLog, MemoryRecoveryLog, PositionRecoveryLog, TIMESTAMP_FORMAT};
pub use relay::{MemoryRelay, PowerRelay, RelayError, ScriptRelay};
