//! # Stepper Serial Transport Layer
//!
//! 串口硬件抽象层，提供统一的 SCL 收发接口。
//!
//! 协议是严格的请求-应答：同一时刻只有一条命令在途。应答按固定字节窗口读取，
//! 窗口读满或读超时即返回。

use std::time::Duration;
use thiserror::Error;

pub use stepper_protocol::Command;

pub mod port;
pub mod reply;

#[cfg(feature = "mock")]
pub mod mock;

pub use port::{SerialConfig, SerialPortAdapter};
pub use reply::{REPLY_WINDOW, Reply};

#[cfg(feature = "mock")]
pub use mock::{MockDevice, MockSerialAdapter};

/// 串口适配层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Port Error: {0}")]
    Port(#[from] serialport::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Port {0} is not open")]
    NotOpen(String),
}

impl SerialError {
    /// 是否为读超时（包括底层 IO 的 TimedOut）
    pub fn is_timeout(&self) -> bool {
        match self {
            SerialError::Timeout => true,
            SerialError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// 串口适配器
///
/// 实现者只需要提供字节级收发与缓冲区清理，命令编码与应答窗口由默认方法完成。
pub trait SerialAdapter: Send {
    /// 写入全部字节
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// 读取可用字节，返回读取数量
    ///
    /// 在读超时内没有任何数据时返回 `SerialError::Timeout`。
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    /// 丢弃输入缓冲区中尚未读取的数据
    fn clear_input(&mut self) -> Result<(), SerialError>;

    /// 丢弃输出缓冲区中尚未发送的数据
    fn clear_output(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    /// 端口标识（如 `/dev/ttyUSB0`）
    fn port_name(&self) -> &str;

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), SerialError> {
        Ok(())
    }

    /// 清空输入与输出缓冲区
    fn clear_all(&mut self) -> Result<(), SerialError> {
        self.clear_input()?;
        self.clear_output()
    }

    /// 发送一条命令（不读取应答）
    ///
    /// 发送前丢弃残留输入，保证随后读到的是本命令的应答。
    fn write_command(&mut self, command: &Command) -> Result<(), SerialError> {
        self.clear_input()?;
        tracing::trace!(port = self.port_name(), %command, "send");
        self.send(&command.to_wire())
    }

    /// 读取一个应答窗口
    ///
    /// 读满 `window` 字节或读超时即返回；超时且未读到任何数据时返回空文本。
    /// 读完后清空缓冲区。
    fn read_reply(&mut self, window: usize) -> Result<Reply, SerialError> {
        let mut buf = vec![0u8; window];
        let mut filled = 0;
        while filled < window {
            match self.receive(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        self.clear_all()?;

        let reply = Reply::from_bytes(buf);
        tracing::trace!(port = self.port_name(), %reply, "recv");
        Ok(reply)
    }

    /// 发送命令并读取应答窗口
    fn query(&mut self, command: &Command, window: usize) -> Result<Reply, SerialError> {
        self.write_command(command)?;
        self.read_reply(window)
    }
}

impl<T: SerialAdapter + ?Sized> SerialAdapter for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).send(bytes)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).receive(buf)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        (**self).clear_input()
    }

    fn clear_output(&mut self) -> Result<(), SerialError> {
        (**self).clear_output()
    }

    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        (**self).set_read_timeout(timeout)
    }
}
