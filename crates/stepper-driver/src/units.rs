//! 逻辑单位与步数换算
//!
//! - 旋转轴：`steps = trunc(deg / 360 * steps_per_rev * gear_ratio)`
//! - 直线轴：`steps = trunc(mm * steps_per_mm)`
//!
//! 向零截断，量化后的运动量绝对值不会超过请求值。

use crate::kind::ActuatorKind;
use std::time::Duration;

/// 驱动器 `FL` / `SP` 可表示的最大步数（32 位有符号寄存器）
pub const MAX_DEVICE_STEPS: i64 = i32::MAX as i64;

/// 步数是否在驱动器寄存器范围内
pub fn within_device_range(steps: i64) -> bool {
    steps.checked_abs().is_some_and(|s| s <= MAX_DEVICE_STEPS)
}

/// 单位换算器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    kind: ActuatorKind,
    steps_per_rev: u32,
    /// 旋转轴减速比
    gear_ratio: f64,
    /// 直线轴每毫米步数
    steps_per_mm: f64,
}

impl UnitConverter {
    pub fn rotational(steps_per_rev: u32, gear_ratio: f64) -> Self {
        Self {
            kind: ActuatorKind::Rotational,
            steps_per_rev,
            gear_ratio,
            steps_per_mm: 0.0,
        }
    }

    pub fn linear(steps_per_rev: u32, steps_per_mm: f64) -> Self {
        Self {
            kind: ActuatorKind::Linear,
            steps_per_rev,
            gear_ratio: 1.0,
            steps_per_mm,
        }
    }

    pub fn kind(&self) -> ActuatorKind {
        self.kind
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.steps_per_rev
    }

    /// 逻辑量 -> 步数（向零截断）
    ///
    /// 非有限值或超出驱动器寄存器范围时返回 None。
    pub fn to_steps(&self, logical: f64) -> Option<i64> {
        let steps = match self.kind {
            ActuatorKind::Rotational => {
                (logical / 360.0) * f64::from(self.steps_per_rev) * self.gear_ratio
            },
            ActuatorKind::Linear => logical * self.steps_per_mm,
        }
        .trunc();
        if !steps.is_finite() || steps.abs() > MAX_DEVICE_STEPS as f64 {
            return None;
        }
        Some(steps as i64)
    }

    /// 步数 -> 逻辑量（精确实数除法）
    pub fn to_logical(&self, steps: i64) -> f64 {
        match self.kind {
            ActuatorKind::Rotational => {
                steps as f64 * (360.0 / (f64::from(self.steps_per_rev) * self.gear_ratio))
            },
            ActuatorKind::Linear => steps as f64 / self.steps_per_mm,
        }
    }

    /// 量化误差：实际可达逻辑量 - 请求量
    pub fn quantization_error(&self, steps: i64, requested: f64) -> f64 {
        self.to_logical(steps) - requested
    }

    /// 运动时间估算（状态轮询失败时的兜底等待）
    pub fn estimated_duration(&self, steps: i64) -> Duration {
        let seconds =
            (self.kind.timing_rate() * steps as f64 / f64::from(self.steps_per_rev)).abs();
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}
