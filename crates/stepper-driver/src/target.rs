//! 运动目标

use std::fmt;
use std::str::FromStr;

/// `move` 操作的目标
///
/// `IN` / `OUT` 只对直线轴有效，分别对应软件下限与上限。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveTarget {
    In,
    Out,
    /// 绝对位置（度或毫米）
    Absolute(f64),
}

impl FromStr for MoveTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("IN") {
            return Ok(MoveTarget::In);
        }
        if s.eq_ignore_ascii_case("OUT") {
            return Ok(MoveTarget::Out);
        }
        match s.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(MoveTarget::Absolute(value)),
            _ => Err(format!(
                "invalid move target {:?}, expected IN, OUT or a position",
                s
            )),
        }
    }
}

impl fmt::Display for MoveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveTarget::In => write!(f, "IN"),
            MoveTarget::Out => write!(f, "OUT"),
            MoveTarget::Absolute(value) => write!(f, "{}", value),
        }
    }
}
