//! Builder 模式实现
//!
//! 提供链式构造 `ActuatorDriver` 实例的便捷方式。

use crate::config::DriverConfig;
use crate::driver::{ActuatorDriver, StartupReport};
use crate::error::DriverError;
use crate::kind::ActuatorKind;
use std::path::Path;
use stepper_serial::{SerialAdapter, SerialConfig, SerialPortAdapter};
use stepper_tools::{
    ActuatorProfile, FileRecoveryLog, MemoryRecoveryLog, MemoryRelay, PositionRecoveryLog,
    PowerRelay, ScriptRelay,
};
use tracing::{debug, warn};

/// Actuator Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use stepper_driver::{ActuatorBuilder, DriverConfig};
///
/// let driver = ActuatorBuilder::rotational("tilt")
///     .port("/dev/ttyUSB0")
///     .log_file("/tmp/tilt.log")
///     .unwrap()
///     .gear_ratio(14.0)
///     .build()
///     .unwrap();
/// ```
pub struct ActuatorBuilder {
    name: String,
    kind: ActuatorKind,
    /// 串口路径；设置了 `transport` 时忽略
    port: Option<String>,
    transport: Option<Box<dyn SerialAdapter>>,
    log: Option<Box<dyn PositionRecoveryLog>>,
    /// 日志是否新建（决定启动时是否执行首次启动）
    fresh_log: bool,
    relay: Option<Box<dyn PowerRelay>>,
    config: DriverConfig,
}

impl ActuatorBuilder {
    pub fn new(name: impl Into<String>, kind: ActuatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            port: None,
            transport: None,
            log: None,
            fresh_log: false,
            relay: None,
            config: DriverConfig::default(),
        }
    }

    /// 旋转轴
    pub fn rotational(name: impl Into<String>) -> Self {
        Self::new(name, ActuatorKind::Rotational)
    }

    /// 直线轴
    pub fn linear(name: impl Into<String>) -> Self {
        Self::new(name, ActuatorKind::Linear)
    }

    /// 由配置文件条目构造
    ///
    /// # 参数
    /// - `log_dir`: 日志相对路径的基准目录
    /// - `script_dir`: 继电器脚本所在目录
    ///
    /// # 错误
    /// - 继电器编号超出范围
    /// - 日志文件无法创建或读取
    pub fn from_profile(
        profile: &ActuatorProfile,
        log_dir: &Path,
        script_dir: &Path,
    ) -> Result<Self, DriverError> {
        let channel = profile
            .relay_channel()
            .map_err(|e| DriverError::InvalidConfig(format!("{:#}", e)))?;

        let mut builder = Self::new(profile.name.clone(), profile.kind.into())
            .port(profile.port.clone())
            .relay(Box::new(ScriptRelay::new(script_dir, channel)))
            .log_file(profile.log_path(log_dir))?;
        if let Some(timeout_ms) = profile.read_timeout_ms {
            builder.config.read_timeout_ms = timeout_ms;
        }
        Ok(builder)
    }

    /// 设置串口路径（`build` 时打开）
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 使用已打开的串口适配器（测试中传入 mock）
    pub fn transport(mut self, transport: Box<dyn SerialAdapter>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 使用指定的恢复日志
    pub fn log(mut self, log: Box<dyn PositionRecoveryLog>) -> Self {
        self.fresh_log = log.is_empty();
        self.log = Some(log);
        self
    }

    /// 打开（或创建）文件恢复日志
    pub fn log_file(mut self, path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let log = FileRecoveryLog::open(path)?;
        self.fresh_log = log.was_created();
        self.log = Some(Box::new(log));
        Ok(self)
    }

    /// 设置电源继电器
    pub fn relay(mut self, relay: Box<dyn PowerRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// 设置驱动配置
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// 旋转轴减速比
    pub fn gear_ratio(mut self, gear_ratio: f64) -> Self {
        self.config.gear_ratio = gear_ratio;
        self
    }

    /// 直线轴标定前的每毫米步数
    pub fn steps_per_mm(mut self, steps_per_mm: f64) -> Self {
        self.config.default_steps_per_mm = steps_per_mm;
        self
    }

    /// 日志是否为新建
    pub fn is_fresh_log(&self) -> bool {
        self.fresh_log
    }

    /// 构建驱动
    ///
    /// 串口打不开时只记录警告，驱动处于未连接状态，之后可以 `set_port`。
    pub fn build(self) -> Result<ActuatorDriver, DriverError> {
        self.into_parts().map(|(driver, _)| driver)
    }

    /// 构建驱动并执行启动流程
    pub fn start(self) -> Result<(ActuatorDriver, StartupReport), DriverError> {
        let (mut driver, fresh_log) = self.into_parts()?;
        let report = driver.startup(fresh_log)?;
        Ok((driver, report))
    }

    fn into_parts(self) -> Result<(ActuatorDriver, bool), DriverError> {
        self.config.validate()?;

        let (transport, port) = match (self.transport, self.port) {
            (Some(transport), _) => {
                let port = transport.port_name().to_string();
                (Some(transport), port)
            },
            (None, Some(port)) => {
                let serial = SerialConfig::new(port.clone())
                    .baud_rate(self.config.baud_rate)
                    .read_timeout(self.config.read_timeout());
                match SerialPortAdapter::open(&serial) {
                    Ok(adapter) => (Some(Box::new(adapter) as Box<dyn SerialAdapter>), port),
                    Err(e) => {
                        warn!(
                            actuator = %self.name,
                            port = %port,
                            error = %e,
                            "Failed to initialize serial connection, check that the port exists and is valid"
                        );
                        (None, port)
                    },
                }
            },
            (None, None) => (None, String::new()),
        };

        let log = self.log.unwrap_or_else(|| {
            debug!(actuator = %self.name, "No recovery log configured, keeping records in memory");
            Box::new(MemoryRecoveryLog::new())
        });
        let relay = self.relay.unwrap_or_else(|| {
            debug!(actuator = %self.name, "No relay configured, power switching is simulated");
            Box::new(MemoryRelay::new())
        });

        let driver = ActuatorDriver::new(
            self.name,
            self.kind,
            port,
            self.config,
            transport,
            log,
            relay,
        );
        Ok((driver, self.fresh_log))
    }
}
