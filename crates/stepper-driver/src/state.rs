//! 执行器状态
//!
//! 状态只属于一个 `ActuatorDriver`，不跨线程共享。

use crate::kind::ActuatorKind;
use crate::units::UnitConverter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 上下限相等的容差，此时不做范围检查
pub const LIMIT_EPSILON: f64 = 1e-6;

/// 软件限位
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelLimits {
    pub lower: f64,
    pub upper: f64,
}

impl TravelLimits {
    /// 按大小排序后构造
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// 上下限相等：范围检查关闭
    pub fn is_unbounded(&self) -> bool {
        (self.upper - self.lower).abs() < LIMIT_EPSILON
    }

    pub fn contains(&self, value: f64) -> bool {
        self.is_unbounded() || (self.lower <= value && value <= self.upper)
    }
}

impl fmt::Display for TravelLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        enabled: bool,
    },
    Moving,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected { .. } | ConnectionState::Moving
        )
    }
}

/// 执行器内部状态
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorState {
    pub kind: ActuatorKind,
    /// 对设备步数计数器的判断
    pub position_steps: i64,
    /// 逻辑位置（度或毫米）
    pub position: f64,
    /// 每转步数，总是细分表中的值
    pub steps_per_rev: u32,
    /// 旋转轴减速比
    pub gear_ratio: f64,
    /// 直线轴每毫米步数
    pub steps_per_mm: f64,
    pub limits: TravelLimits,
    pub previous_move_steps: i64,
    pub accumulated_error: f64,
    /// 缓存的使能状态（可能过期）
    pub enabled: bool,
    /// 最近一次探测是否成功
    pub booted: bool,
    pub connection: ConnectionState,
    pub port: String,
}

impl ActuatorState {
    pub fn new(
        kind: ActuatorKind,
        port: impl Into<String>,
        steps_per_rev: u32,
        gear_ratio: f64,
        steps_per_mm: f64,
        limits: TravelLimits,
    ) -> Self {
        Self {
            kind,
            position_steps: 0,
            position: 0.0,
            steps_per_rev,
            gear_ratio,
            steps_per_mm,
            limits,
            previous_move_steps: 0,
            accumulated_error: 0.0,
            enabled: false,
            booted: false,
            connection: ConnectionState::Disconnected,
            port: port.into(),
        }
    }

    /// 当前参数下的单位换算器
    pub fn converter(&self) -> UnitConverter {
        match self.kind {
            ActuatorKind::Rotational => UnitConverter::rotational(self.steps_per_rev, self.gear_ratio),
            ActuatorKind::Linear => UnitConverter::linear(self.steps_per_rev, self.steps_per_mm),
        }
    }
}

/// 状态快照（用于状态表展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSnapshot {
    pub name: String,
    pub kind: ActuatorKind,
    pub port: String,
    pub booted: bool,
    pub enabled: bool,
    pub connection: ConnectionState,
    pub position: f64,
    pub position_steps: i64,
    pub steps_per_rev: u32,
    pub steps_per_mm: Option<f64>,
    pub limits: TravelLimits,
    pub accumulated_error: f64,
}

impl ActuatorSnapshot {
    /// 状态表表头，与 `Display` 的列对齐
    pub fn header() -> String {
        format!(
            "{:<12} {:<4} {:<16} {:<6} {:<7} {:>12} {:>10} {:>7} {:>22}",
            "name", "type", "port", "booted", "enabled", "position", "steps", "res", "limits"
        )
    }
}

impl fmt::Display for ActuatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = format!("{:.3} {}", self.position, self.kind.unit());
        write!(
            f,
            "{:<12} {:<4} {:<16} {:<6} {:<7} {:>12} {:>10} {:>7} {:>22}",
            self.name,
            self.kind.code(),
            self.port,
            self.booted,
            self.enabled,
            position,
            self.position_steps,
            self.steps_per_rev,
            self.limits.to_string()
        )
    }
}
