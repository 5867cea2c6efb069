//! 驱动配置

use crate::error::DriverError;
use crate::kind::ActuatorKind;
use crate::units::MAX_DEVICE_STEPS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 驱动配置
///
/// # Example
///
/// ```
/// use stepper_driver::DriverConfig;
///
/// let config = DriverConfig {
///     read_timeout_ms: 1000,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 串口读超时（毫秒），1~2 秒
    pub read_timeout_ms: u64,
    pub baud_rate: u32,
    /// 应答窗口（字节）
    pub reply_window: usize,
    /// 首次启动断电后的等待（毫秒）
    pub power_cycle_delay_ms: u64,
    /// 上电后发送模式键前的等待（毫秒）
    ///
    /// 驱动器只在上电后 2ms~2s 内接受模式键。
    pub mode_key_delay_ms: u64,
    /// 加速度（rev/s²）
    pub acceleration: f64,
    /// 减速度（rev/s²）
    pub deceleration: f64,
    /// 没有历史记录时使用的细分
    pub default_resolution: u32,
    /// 旋转轴减速比
    pub gear_ratio: f64,
    /// 直线轴标定前的每毫米步数
    pub default_steps_per_mm: f64,
    /// 旋转轴默认软件限位（度）
    pub rotational_limits: (f64, f64),
    /// 直线轴默认软件限位（毫米）
    pub linear_limits: (f64, f64),
    /// 回零后软件限位相对两端的内缩量（毫米）
    pub homing_margin_mm: f64,
    /// 回零时单向寻找限位开关的步数
    pub homing_seek_steps: i64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 2000,
            baud_rate: 9600,
            reply_window: 15,
            power_cycle_delay_ms: 1000,
            mode_key_delay_ms: 50,
            acceleration: 10.0,
            deceleration: 10.0,
            default_resolution: 2000,
            gear_ratio: 14.0,
            default_steps_per_mm: 400.0,
            rotational_limits: (0.0, 90.0),
            linear_limits: (0.0, 50.0),
            homing_margin_mm: 2.0,
            homing_seek_steps: 1_000_000,
        }
    }
}

impl DriverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn power_cycle_delay(&self) -> Duration {
        Duration::from_millis(self.power_cycle_delay_ms)
    }

    pub fn mode_key_delay(&self) -> Duration {
        Duration::from_millis(self.mode_key_delay_ms)
    }

    /// 按类型取默认软件限位
    pub fn default_limits(&self, kind: ActuatorKind) -> (f64, f64) {
        match kind {
            ActuatorKind::Rotational => self.rotational_limits,
            ActuatorKind::Linear => self.linear_limits,
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), DriverError> {
        if !(2..=2000).contains(&self.mode_key_delay_ms) {
            return Err(DriverError::InvalidConfig(format!(
                "mode_key_delay_ms must be within 2..=2000, got {}",
                self.mode_key_delay_ms
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.reply_window == 0 {
            return Err(DriverError::InvalidConfig(
                "reply_window must be positive".to_string(),
            ));
        }
        if self.gear_ratio <= 0.0 || self.default_steps_per_mm <= 0.0 {
            return Err(DriverError::InvalidConfig(
                "gear_ratio and default_steps_per_mm must be positive".to_string(),
            ));
        }
        if self.homing_margin_mm < 0.0 || self.homing_seek_steps <= 0 {
            return Err(DriverError::InvalidConfig(
                "homing margin must be non-negative and seek length positive".to_string(),
            ));
        }
        if self.homing_seek_steps > MAX_DEVICE_STEPS {
            return Err(DriverError::InvalidConfig(format!(
                "homing_seek_steps must not exceed {}",
                MAX_DEVICE_STEPS
            )));
        }
        Ok(())
    }
}
