//! serialport 后端
//!
//! 驱动器固定使用 8N1、无流控；波特率出厂为 9600。

use crate::{SerialAdapter, SerialError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// 默认读超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// 串口配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    /// 端口路径
    pub port: String,
    pub baud_rate: u32,
    /// 读超时（1~2 秒）
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// 基于 `serialport` 的串口适配器
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl std::fmt::Debug for SerialPortAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortAdapter").field("name", &self.name).finish()
    }
}

impl SerialPortAdapter {
    /// 按配置打开串口
    ///
    /// # 错误
    /// - 端口不存在或无权限：`SerialError::Port`
    pub fn open(config: &SerialConfig) -> Result<Self, SerialError> {
        debug!(
            port = %config.port,
            baud = config.baud_rate,
            "Opening serial port"
        );
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()?;
        info!(port = %config.port, "Serial port opened");
        Ok(Self {
            port,
            name: config.port.clone(),
        })
    }

    /// 以默认参数打开
    pub fn open_path(path: &str) -> Result<Self, SerialError> {
        Self::open(&SerialConfig::new(path))
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(SerialError::Timeout),
            Err(e) => Err(SerialError::Io(e)),
        }
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn clear_output(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Output)?;
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.name
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}
