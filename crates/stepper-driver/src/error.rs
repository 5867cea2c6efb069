//! 驱动层错误类型定义

use crate::kind::ActuatorKind;
use crate::record::RecordError;
use std::fmt;
use stepper_protocol::ProtocolError;
use stepper_serial::SerialError;
use stepper_tools::RelayError;
use thiserror::Error;

/// 首次启动阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    PowerOff,
    PowerOn,
    ModeKey,
    Probe,
    Configure,
    Verify,
}

impl BootStage {
    /// 失败时需要检查的前提条件
    pub fn hint(self) -> &'static str {
        match self {
            BootStage::PowerOff | BootStage::PowerOn => {
                "check that the relay is reachable, the relay index is correct and the relay scripts are configured"
            },
            BootStage::ModeKey | BootStage::Configure => {
                "check that the serial port is correct and open"
            },
            BootStage::Probe | BootStage::Verify => {
                "check that the controller is powered, the serial port is correct, the relay index is correct and the relay is switched on"
            },
        }
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::PowerOff => "power off",
            BootStage::PowerOn => "power on",
            BootStage::ModeKey => "mode key",
            BootStage::Probe => "probe",
            BootStage::Configure => "configure",
            BootStage::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 应答解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 应答不是文本
    #[error("Undecodable reply to {command}: 0x{hex}")]
    UndecodableReply { command: String, hex: String },

    /// 串口未打开
    #[error("Actuator {0} is not connected")]
    NotConnected(String),

    /// 探测应答不符
    #[error("Probe reply mismatch: got {reply:?}")]
    ProbeMismatch { reply: String },

    /// 首次启动失败
    #[error("First boot failed at {stage} stage: {reason}; {}", .stage.hint())]
    Boot { stage: BootStage, reason: String },

    /// 目标超出软件限位
    #[error("Move to {target:.5} would put it out of range [{lower}, {upper}]")]
    OutOfRange { target: f64, lower: f64, upper: f64 },

    /// 电机未使能
    #[error("Motor is not enabled")]
    MotorDisabled,

    /// 设备步数与记录不一致
    #[error("Position mismatch: expected {expected} steps, device reports {actual}")]
    PositionMismatch { expected: i64, actual: i64 },

    /// 细分请求无效
    #[error("Invalid resolution {requested}: must be at least {minimum}")]
    InvalidResolution { requested: u32, minimum: u32 },

    /// 该类型执行器不支持此操作
    #[error("{operation} is not supported for {kind} actuators")]
    UnsupportedForKind {
        operation: &'static str,
        kind: ActuatorKind,
    },

    /// 无效参数
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 回零失败
    #[error("Homing failed: {0}")]
    Homing(String),

    /// 继电器错误
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// 恢复日志读写错误
    #[error("Recovery log error: {0}")]
    Log(#[from] std::io::Error),

    /// 记录解析错误
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 注册表中已有同名执行器
    #[error("Actuator {0} already registered")]
    DuplicateActuator(String),

    /// 注册表中没有该执行器
    #[error("Unknown actuator {0}")]
    UnknownActuator(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::OutOfRange {
            target: 95.0,
            lower: 0.0,
            upper: 90.0,
        };
        assert_eq!(
            err.to_string(),
            "Move to 95.00000 would put it out of range [0, 90]"
        );

        let err = DriverError::PositionMismatch {
            expected: 900,
            actual: 901,
        };
        assert!(err.to_string().contains("expected 900"));

        let err = DriverError::UnsupportedForKind {
            operation: "move IN",
            kind: ActuatorKind::Rotational,
        };
        assert_eq!(
            err.to_string(),
            "move IN is not supported for Rotational actuators"
        );
    }

    #[test]
    fn test_boot_error_names_stage_and_hint() {
        let err = DriverError::Boot {
            stage: BootStage::Probe,
            reason: "no FOO echo".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("probe stage"));
        assert!(msg.contains("no FOO echo"));
        assert!(msg.contains("controller is powered"));
    }

    #[test]
    fn test_from_conversions() {
        let err: DriverError = SerialError::Timeout.into();
        assert!(matches!(err, DriverError::Serial(_)));

        let err: DriverError = ProtocolError::InvalidBitString("0".into()).into();
        assert!(matches!(err, DriverError::Protocol(_)));

        let err: DriverError = std::io::Error::other("disk full").into();
        assert!(matches!(err, DriverError::Log(_)));
    }
}
