//! SCL 命令编码
//!
//! 所有命令都是 ASCII 字符串，以回车 `\r` 结尾。协议没有请求 ID，
//! 也没有多路复用：发送下一条命令前必须读完上一条的应答（或等待超时）。

use std::fmt;

/// 连接探测令牌
///
/// `SSFOO` 让驱动器回显 `FOO`，用于确认串口与驱动器通信正常。
pub const PROBE_TOKEN: &str = "FOO";

/// 命令结束符
pub const TERMINATOR: char = '\r';

/// 硬件行程限位输入模式（`DL` 命令）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LimitInputMode {
    /// 限位开关常闭，断开时触发
    ActiveWhenOpen = 1,
    /// 限位开关常开，闭合时触发
    ActiveWhenClosed = 2,
    /// 不使用限位输入
    ///
    /// 出厂时上下限位被设为同一值，首次运动会直接报警，因此旋转轴必须关闭。
    Disabled = 3,
}

/// SCL 命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 上电后 2ms~2s 内发送，使驱动器进入 SCL 模式
    ModeKey,
    /// 连接探测（`SSFOO`）
    Probe,
    /// 电源模式（`PM`），2 = 关闭自动检测，避免无法清除的报警
    PowerMode(u8),
    /// 行程限位输入（`DL`）
    DefineLimits(LimitInputMode),
    /// 应答协议（`PR`），1 = 不带 ack/nack 前缀
    Protocol(u8),
    /// 立即命令以十进制返回（`IFD`）
    ImmediateFormatDecimal,
    /// 控制模式（`CM`），21 = 点对点定位
    CommandMode(u8),
    /// 加速度（`AC`，rev/s²）
    Acceleration(f64),
    /// 减速度（`DE`，rev/s²）
    Deceleration(f64),
    /// 将参数写入非易失存储（`SA`）
    SaveParameters,
    /// 设定当前位置步数（`SP<n>`）
    SetPosition(i64),
    /// 查询当前位置步数（`SP`）
    QueryPosition,
    /// 查询状态寄存器（`SC`）
    QueryStatus,
    /// 查询报警寄存器（`AL`）
    QueryAlarm,
    /// 清除报警（`AR`）
    AlarmReset,
    /// 电机使能（`ME`）
    MotorEnable,
    /// 电机失能（`MD`）
    MotorDisable,
    /// 最大速度（`VE`，rev/s）
    Velocity(f64),
    /// 相对移动指定步数（`FL<n>`）
    FeedToLength(i64),
    /// 细分选择（`MR<index>`），index 为细分表下标
    MicrostepResolution(usize),
    /// 原样发送（绕过所有软件限位检查）
    Raw(String),
}

impl Command {
    /// 编码为线上字节（含结束符）
    pub fn to_wire(&self) -> Vec<u8> {
        let mut line = self.to_string();
        line.push(TERMINATOR);
        line.into_bytes()
    }

    /// 是否为查询命令（驱动器会返回应答）
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Command::Probe | Command::QueryPosition | Command::QueryStatus | Command::QueryAlarm
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ModeKey => write!(f, "00"),
            Command::Probe => write!(f, "SS{}", PROBE_TOKEN),
            Command::PowerMode(mode) => write!(f, "PM{}", mode),
            Command::DefineLimits(mode) => write!(f, "DL{}", *mode as u8),
            Command::Protocol(code) => write!(f, "PR{}", code),
            Command::ImmediateFormatDecimal => write!(f, "IFD"),
            Command::CommandMode(mode) => write!(f, "CM{}", mode),
            Command::Acceleration(value) => write!(f, "AC{}", value),
            Command::Deceleration(value) => write!(f, "DE{}", value),
            Command::SaveParameters => write!(f, "SA"),
            Command::SetPosition(steps) => write!(f, "SP{}", steps),
            Command::QueryPosition => write!(f, "SP"),
            Command::QueryStatus => write!(f, "SC"),
            Command::QueryAlarm => write!(f, "AL"),
            Command::AlarmReset => write!(f, "AR"),
            Command::MotorEnable => write!(f, "ME"),
            Command::MotorDisable => write!(f, "MD"),
            Command::Velocity(value) => write!(f, "VE{}", value),
            Command::FeedToLength(steps) => write!(f, "FL{}", steps),
            Command::MicrostepResolution(index) => write!(f, "MR{}", index),
            Command::Raw(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::Probe.to_string(), "SSFOO");
        assert_eq!(Command::PowerMode(2).to_string(), "PM2");
        assert_eq!(
            Command::DefineLimits(LimitInputMode::Disabled).to_string(),
            "DL3"
        );
        assert_eq!(Command::FeedToLength(-400).to_string(), "FL-400");
        assert_eq!(Command::SetPosition(0).to_string(), "SP0");
        assert_eq!(Command::MicrostepResolution(3).to_string(), "MR3");
        assert_eq!(Command::Raw("IFD".to_string()).to_string(), "IFD");
    }

    #[test]
    fn test_float_parameters_drop_trailing_zero() {
        assert_eq!(Command::Velocity(1.0).to_string(), "VE1");
        assert_eq!(Command::Velocity(0.5).to_string(), "VE0.5");
        assert_eq!(Command::Acceleration(25.0).to_string(), "AC25");
    }

    #[test]
    fn test_to_wire_appends_carriage_return() {
        assert_eq!(Command::QueryStatus.to_wire(), b"SC\r".to_vec());
        assert_eq!(Command::ModeKey.to_wire(), b"00\r".to_vec());
    }

    #[test]
    fn test_expects_reply() {
        assert!(Command::QueryStatus.expects_reply());
        assert!(Command::Probe.expects_reply());
        assert!(!Command::FeedToLength(10).expects_reply());
        assert!(!Command::SetPosition(10).expects_reply());
    }
}
