//! 执行器类型
//!
//! 旋转轴与直线轴共用同一个状态机，差异集中在这里：
//! 速度命令、时间估算系数、硬件限位输入模式以及单位。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stepper_protocol::LimitInputMode;
use stepper_tools::ProfileKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuatorKind {
    /// 旋转轴，逻辑位置单位为度
    Rotational,
    /// 直线轴，逻辑位置单位为毫米
    Linear,
}

impl ActuatorKind {
    /// 运动速度（`VE`，rev/s）
    pub fn velocity(self) -> f64 {
        match self {
            ActuatorKind::Rotational => 1.0,
            ActuatorKind::Linear => 0.5,
        }
    }

    /// 运动时间估算系数（秒/转），对应 `velocity()` 下的实测值
    pub fn timing_rate(self) -> f64 {
        match self {
            ActuatorKind::Rotational => 1.1,
            ActuatorKind::Linear => 2.2,
        }
    }

    /// 首次启动时写入的硬件限位输入模式
    pub fn limit_input(self) -> LimitInputMode {
        match self {
            ActuatorKind::Rotational => LimitInputMode::Disabled,
            ActuatorKind::Linear => LimitInputMode::ActiveWhenOpen,
        }
    }

    /// 逻辑单位
    pub fn unit(self) -> &'static str {
        match self {
            ActuatorKind::Rotational => "deg",
            ActuatorKind::Linear => "mm",
        }
    }

    /// 单字母代码（配置文件使用）
    pub fn code(self) -> char {
        match self {
            ActuatorKind::Rotational => 'R',
            ActuatorKind::Linear => 'L',
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorKind::Rotational => write!(f, "Rotational"),
            ActuatorKind::Linear => write!(f, "Linear"),
        }
    }
}

impl FromStr for ActuatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "R" | "r" | "Rotational" | "rotational" => Ok(ActuatorKind::Rotational),
            "L" | "l" | "Linear" | "linear" => Ok(ActuatorKind::Linear),
            other => Err(format!(
                "unknown actuator kind {:?}, only rotational (R) or linear (L) supported",
                other
            )),
        }
    }
}

impl From<ProfileKind> for ActuatorKind {
    fn from(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Rotational => ActuatorKind::Rotational,
            ProfileKind::Linear => ActuatorKind::Linear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_constants() {
        assert_eq!(ActuatorKind::Rotational.velocity(), 1.0);
        assert_eq!(ActuatorKind::Linear.velocity(), 0.5);
        assert_eq!(ActuatorKind::Rotational.timing_rate(), 1.1);
        assert_eq!(ActuatorKind::Linear.timing_rate(), 2.2);
        assert_eq!(
            ActuatorKind::Rotational.limit_input(),
            LimitInputMode::Disabled
        );
        assert_eq!(
            ActuatorKind::Linear.limit_input(),
            LimitInputMode::ActiveWhenOpen
        );
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("R".parse::<ActuatorKind>().unwrap(), ActuatorKind::Rotational);
        assert_eq!(" L ".parse::<ActuatorKind>().unwrap(), ActuatorKind::Linear);
        assert!("X".parse::<ActuatorKind>().is_err());
    }

    #[test]
    fn test_from_profile_kind() {
        assert_eq!(ActuatorKind::from(ProfileKind::Linear), ActuatorKind::Linear);
        assert_eq!(ActuatorKind::Linear.code(), 'L');
    }
}
