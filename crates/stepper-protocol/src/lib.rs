//! # Stepper Protocol
//!
//! 步进驱动器 SCL 文本协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 命令编码（ASCII + `\r`）
//! - `reply`: 应答解析（去掉 3 字符前缀后解析十进制寄存器）
//! - `resolution`: 驱动器支持的细分表
//! - `status`: 状态/报警寄存器位域解码
//!
//! ## 寄存器表示
//!
//! 驱动器以十进制 ASCII 返回 16 位寄存器。解码时先转为 16 位二进制串
//! （高位在前，左侧补零），再按位读取；位号从最低位开始计数。

pub mod command;
pub mod reply;
pub mod resolution;
pub mod status;

// 重新导出常用类型
pub use command::{Command, LimitInputMode, PROBE_TOKEN};
pub use reply::{parse_position, parse_register, probe_echo_contains, probe_echo_matches};
pub use resolution::{MIN_RESOLUTION, RESOLUTION_TABLE, Resolution, ResolutionTable};
pub use status::{
    AlarmCode, AlarmFlags, AlarmReport, StatusFlag, StatusFlags, bit_string, parse_bit_string,
};

use thiserror::Error;

/// 协议解析错误类型
///
/// 解码失败必须显式返回，调用方应视为"状态未知"，而不是"未在运动"。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Reply too short: expected at least {expected} bytes, got {actual}")]
    ReplyTooShort { expected: usize, actual: usize },

    #[error("Invalid register digits in reply {reply:?}")]
    InvalidDigits { reply: String },

    #[error("Register value {value} does not fit in 16 bits")]
    RegisterOverflow { value: u64 },

    #[error("Invalid bit string {0:?}: expected exactly 16 binary digits")]
    InvalidBitString(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
