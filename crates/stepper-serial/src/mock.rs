//! 模拟 SCL 驱动器
//!
//! 用于测试的无硬件驱动器模型。`MockDevice` 是可克隆的句柄，
//! 测试代码通过它注入故障、检查收到的命令；`MockSerialAdapter`
//! 作为串口交给驱动层使用，两者共享同一份设备状态。
//!
//! 位置模型：设备内部有一个物理位置，`SP<n>` 只改变计数器偏移；
//! 配置了行程限位时，`FL` 会停在限位处并置对应的限位报警。

use crate::{SerialAdapter, SerialError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

const STATUS_ENABLED: u16 = 1 << 0;
const STATUS_MOVING: u16 = 1 << 4;
const STATUS_ALARM: u16 = 1 << 9;
const ALARM_CCW_LIMIT: u16 = 1 << 1;
const ALARM_CW_LIMIT: u16 = 1 << 2;

/// 模拟设备状态
#[derive(Debug, Clone)]
pub struct MockDeviceState {
    /// 收到的全部命令（不含结束符）
    pub commands: Vec<String>,
    /// 物理位置（步）
    pub physical_steps: i64,
    /// 计数器偏移：应答的位置 = 物理位置 - 偏移
    pub counter_offset: i64,
    pub enabled: bool,
    pub alarm: u16,
    /// 当前细分表下标
    pub resolution_index: Option<usize>,
    /// FL 之后 SC 报告"运动中"的次数
    pub moving_polls: u32,
    remaining_moving_polls: u32,
    /// 物理行程限位（最小, 最大）
    pub travel_limits: Option<(i64, i64)>,
    /// 为 false 时设备不作任何应答
    pub responsive: bool,
    /// 为 true 时写入返回 IO 错误
    pub io_failure: bool,
    /// 是否收到过模式键 `00`
    pub scl_mode: bool,
    /// 优先返回的应答（用于注入乱码）
    injected: VecDeque<Vec<u8>>,
    /// 探测应答覆盖
    pub probe_reply: Option<String>,
    rx: VecDeque<u8>,
}

impl Default for MockDeviceState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            physical_steps: 0,
            counter_offset: 0,
            enabled: true,
            alarm: 0,
            resolution_index: None,
            moving_polls: 1,
            remaining_moving_polls: 0,
            travel_limits: None,
            responsive: true,
            io_failure: false,
            scl_mode: false,
            injected: VecDeque::new(),
            probe_reply: None,
            rx: VecDeque::new(),
        }
    }
}

impl MockDeviceState {
    fn position(&self) -> i64 {
        self.physical_steps - self.counter_offset
    }

    fn status(&self) -> u16 {
        let mut status = 0;
        if self.enabled {
            status |= STATUS_ENABLED;
        }
        if self.remaining_moving_polls > 0 {
            status |= STATUS_MOVING;
        }
        if self.alarm != 0 {
            status |= STATUS_ALARM;
        }
        status
    }

    fn reply(&mut self, text: String) {
        if !self.responsive {
            return;
        }
        let bytes = match self.injected.pop_front() {
            Some(bytes) => bytes,
            None => text.into_bytes(),
        };
        self.rx.extend(bytes);
    }

    fn feed(&mut self, delta: i64) {
        let mut target = self.physical_steps + delta;
        if let Some((min, max)) = self.travel_limits {
            if target < min {
                target = min;
                self.alarm |= ALARM_CCW_LIMIT;
            } else if target > max {
                target = max;
                self.alarm |= ALARM_CW_LIMIT;
            }
        }
        self.physical_steps = target;
        self.remaining_moving_polls = self.moving_polls;
    }

    fn handle(&mut self, line: &str) {
        self.commands.push(line.to_string());

        match line {
            "00" => self.scl_mode = true,
            "SSFOO" => {
                let echo = self.probe_reply.clone().unwrap_or_else(|| "FOO".to_string());
                self.reply(format!("{}\r", echo));
            },
            "SC" => {
                let status = self.status();
                self.remaining_moving_polls = self.remaining_moving_polls.saturating_sub(1);
                self.reply(format!("SC={}\r", status));
            },
            "AL" => {
                let alarm = self.alarm;
                self.reply(format!("AL={}\r", alarm));
            },
            "SP" => {
                let position = self.position();
                self.reply(format!("SP={}\r", position));
            },
            "AR" => self.alarm = 0,
            "ME" => self.enabled = true,
            "MD" => self.enabled = false,
            _ => {
                if let Some(value) = line.strip_prefix("SP").and_then(|v| v.parse::<i64>().ok()) {
                    self.counter_offset = self.physical_steps - value;
                } else if let Some(delta) =
                    line.strip_prefix("FL").and_then(|v| v.parse::<i64>().ok())
                {
                    self.feed(delta);
                } else if let Some(index) =
                    line.strip_prefix("MR").and_then(|v| v.parse::<usize>().ok())
                {
                    self.resolution_index = Some(index);
                }
            },
        }
    }
}

/// 模拟设备句柄
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockDeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 创建连接到本设备的串口适配器
    pub fn adapter(&self, port: impl Into<String>) -> MockSerialAdapter {
        MockSerialAdapter {
            state: self.state.clone(),
            name: port.into(),
        }
    }

    /// 设备状态快照
    pub fn snapshot(&self) -> MockDeviceState {
        self.lock().clone()
    }

    /// 收到的全部命令
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// 是否收到过指定命令
    pub fn received(&self, command: &str) -> bool {
        self.lock().commands.iter().any(|c| c == command)
    }

    /// 是否收到过以指定前缀开头的命令
    pub fn received_prefix(&self, prefix: &str) -> bool {
        self.lock().commands.iter().any(|c| c.starts_with(prefix))
    }

    /// 当前位置计数器
    pub fn position(&self) -> i64 {
        self.lock().position()
    }

    /// 直接设置位置计数器（模拟设备侧被改动）
    pub fn set_position(&self, steps: i64) {
        let mut state = self.lock();
        state.counter_offset = state.physical_steps - steps;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    pub fn set_alarm(&self, alarm: u16) {
        self.lock().alarm = alarm;
    }

    pub fn alarm(&self) -> u16 {
        self.lock().alarm
    }

    pub fn set_moving_polls(&self, polls: u32) {
        self.lock().moving_polls = polls;
    }

    /// 设置物理行程（相对当前物理位置的最小/最大步数）
    pub fn set_travel_limits(&self, min: i64, max: i64) {
        self.lock().travel_limits = Some((min, max));
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.lock().responsive = responsive;
    }

    pub fn set_io_failure(&self, failure: bool) {
        self.lock().io_failure = failure;
    }

    pub fn set_probe_reply(&self, reply: impl Into<String>) {
        self.lock().probe_reply = Some(reply.into());
    }

    /// 下一条需要应答的命令将收到这些原始字节
    pub fn inject_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().injected.push_back(bytes.into());
    }

    pub fn resolution_index(&self) -> Option<usize> {
        self.lock().resolution_index
    }

    pub fn scl_mode(&self) -> bool {
        self.lock().scl_mode
    }
}

/// 连接到 `MockDevice` 的串口适配器
#[derive(Debug)]
pub struct MockSerialAdapter {
    state: Arc<Mutex<MockDeviceState>>,
    name: String,
}

impl MockSerialAdapter {
    fn lock(&self) -> MutexGuard<'_, MockDeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SerialAdapter for MockSerialAdapter {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut state = self.lock();
        if state.io_failure {
            return Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        let text = String::from_utf8_lossy(bytes);
        for line in text.split('\r').filter(|l| !l.is_empty()) {
            state.handle(line);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut state = self.lock();
        if state.rx.is_empty() {
            return Err(SerialError::Timeout);
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.lock().rx.clear();
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
