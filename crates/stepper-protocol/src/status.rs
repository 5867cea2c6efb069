//! 状态 / 报警寄存器解码
//!
//! 驱动器以十进制返回 16 位寄存器。为了与驱动器手册的表示一致，
//! 寄存器可以渲染为 16 位二进制串（高位在前）：串中下标 `i` 对应位号 `15 - i`。
//!
//! 位号从最低位开始计数，bilge 默认 LSB first，与协议一致。

use crate::ProtocolError;
use bilge::prelude::*;

/// 寄存器宽度（位）
pub const REGISTER_BITS: usize = 16;

/// 将寄存器渲染为 16 位二进制串（高位在前，左侧补零）
pub fn bit_string(raw: u16) -> String {
    format!("{:016b}", raw)
}

/// 解析 16 位二进制串
///
/// 必须恰好 16 个 `0`/`1` 字符，否则返回错误（不会静默当作 0）。
pub fn parse_bit_string(bits: &str) -> Result<u16, ProtocolError> {
    let bits = bits.trim();
    if bits.len() != REGISTER_BITS || !bits.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(ProtocolError::InvalidBitString(bits.to_string()));
    }
    u16::from_str_radix(bits, 2).map_err(|e| ProtocolError::ParseError(e.to_string()))
}

// ============================================================================
// 状态寄存器（SC）
// ============================================================================

/// 状态寄存器位域
///
/// - Bit 0: 电机使能且到位
/// - Bit 1: 采样中
/// - Bit 2: 驱动器故障（查看报警码）
/// - Bit 3: 到位（仅伺服/StepSERVO 有效）
/// - Bit 4: 运动中
/// - Bit 5: 点动中
/// - Bit 6: 停止中
/// - Bit 7: 等待中
/// - Bit 8: 保存参数中
/// - Bit 9: 存在报警（查看报警码）
/// - Bit 10: 回零中
/// - Bit 11: 等待输入
/// - Bit 12: 向导运行中
/// - Bit 13: 检查编码器
/// - Bit 14: Q 程序运行中
/// - Bit 15: 初始化中
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub enabled: bool,          // Bit 0
    pub sampling: bool,         // Bit 1
    pub drive_fault: bool,      // Bit 2
    pub in_position: bool,      // Bit 3
    pub moving: bool,           // Bit 4
    pub jogging: bool,          // Bit 5
    pub stopping: bool,         // Bit 6
    pub waiting: bool,          // Bit 7
    pub saving: bool,           // Bit 8
    pub alarm_present: bool,    // Bit 9
    pub homing: bool,           // Bit 10
    pub waiting_input: bool,    // Bit 11
    pub wizard_running: bool,   // Bit 12
    pub checking_encoder: bool, // Bit 13
    pub q_program_running: bool, // Bit 14
    pub initializing: bool,     // Bit 15
}

/// 状态位名称（按位号索引）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    MotorEnabled,
    Sampling,
    DriveFault,
    InPosition,
    Moving,
    Jogging,
    Stopping,
    Waiting,
    Saving,
    AlarmPresent,
    Homing,
    WaitingForInput,
    WizardRunning,
    CheckingEncoder,
    QProgramRunning,
    Initializing,
}

impl StatusFlag {
    /// 按位号排列的全部状态位
    pub const ALL: [StatusFlag; REGISTER_BITS] = [
        StatusFlag::MotorEnabled,
        StatusFlag::Sampling,
        StatusFlag::DriveFault,
        StatusFlag::InPosition,
        StatusFlag::Moving,
        StatusFlag::Jogging,
        StatusFlag::Stopping,
        StatusFlag::Waiting,
        StatusFlag::Saving,
        StatusFlag::AlarmPresent,
        StatusFlag::Homing,
        StatusFlag::WaitingForInput,
        StatusFlag::WizardRunning,
        StatusFlag::CheckingEncoder,
        StatusFlag::QProgramRunning,
        StatusFlag::Initializing,
    ];

    /// 位号（从最低位开始）
    pub fn bit(self) -> usize {
        self as usize
    }

    pub fn description(self) -> &'static str {
        match self {
            StatusFlag::MotorEnabled => "Motor Enabled and in position",
            StatusFlag::Sampling => "Sampling",
            StatusFlag::DriveFault => "Drive Fault (check Alarm Code)",
            StatusFlag::InPosition => "In Position, only valid on servo and StepSERVO drives",
            StatusFlag::Moving => "Moving",
            StatusFlag::Jogging => "Jogging",
            StatusFlag::Stopping => "Stopping",
            StatusFlag::Waiting => "Waiting",
            StatusFlag::Saving => "Saving",
            StatusFlag::AlarmPresent => "Alarm present (check Alarm Code)",
            StatusFlag::Homing => "Homing",
            StatusFlag::WaitingForInput => "Waiting for input",
            StatusFlag::WizardRunning => "Wizard running",
            StatusFlag::CheckingEncoder => "Checking encoder",
            StatusFlag::QProgramRunning => "Q Program is running",
            StatusFlag::Initializing => "Initializing",
        }
    }
}

impl StatusFlags {
    /// 从寄存器原始值构建
    pub fn from_raw(raw: u16) -> Self {
        StatusFlags::from(u16::new(raw))
    }

    /// 从 16 位二进制串解码
    pub fn decode(bits: &str) -> Result<Self, ProtocolError> {
        parse_bit_string(bits).map(Self::from_raw)
    }

    /// 寄存器原始值
    pub fn raw(&self) -> u16 {
        u16::from(*self)
    }

    /// 电机是否使能（Bit 0）
    pub fn is_enabled(&self) -> bool {
        self.enabled()
    }

    /// 是否仍在运动（Bit 4，即二进制串下标 11）
    pub fn is_moving(&self) -> bool {
        self.moving()
    }

    /// 是否被置位
    pub fn contains(&self, flag: StatusFlag) -> bool {
        self.raw() & (1 << flag.bit()) != 0
    }

    /// 全部置位的状态（按位号从高到低，与二进制串打印顺序一致）
    pub fn asserted(&self) -> Vec<StatusFlag> {
        StatusFlag::ALL.iter().rev().copied().filter(|f| self.contains(*f)).collect()
    }

    /// 二进制串表示
    pub fn bit_string(&self) -> String {
        bit_string(self.raw())
    }
}

// ============================================================================
// 报警寄存器（AL）
// ============================================================================

/// 报警寄存器位域
///
/// - Bit 0: 位置超限
/// - Bit 1: CCW 限位
/// - Bit 2: CW 限位
/// - Bit 3: 过温
/// - Bit 4: 内部电压异常
/// - Bit 5: 过压
/// - Bit 6: 欠压
/// - Bit 7: 过流
/// - Bit 8: 电机绕组开路
/// - Bit 9: 编码器异常
/// - Bit 10: 通信错误
/// - Bit 11: Flash 异常
/// - Bit 12: 无法运动
/// - Bit 13: 保留
/// - Bit 14: 空 Q 段
/// - Bit 15: 保留
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmFlags {
    pub position_limit: bool,      // Bit 0
    pub ccw_limit: bool,           // Bit 1
    pub cw_limit: bool,            // Bit 2
    pub over_temp: bool,           // Bit 3
    pub internal_voltage: bool,    // Bit 4
    pub over_voltage: bool,        // Bit 5
    pub under_voltage: bool,       // Bit 6
    pub over_current: bool,        // Bit 7
    pub open_motor_winding: bool,  // Bit 8
    pub bad_encoder: bool,         // Bit 9
    pub comm_error: bool,          // Bit 10
    pub bad_flash: bool,           // Bit 11
    pub no_move: bool,             // Bit 12
    pub reserved13: bool,          // Bit 13: 保留
    pub blank_q_segment: bool,     // Bit 14
    pub reserved15: bool,          // Bit 15: 保留
}

/// 报警码名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCode {
    PositionLimit,
    CcwLimit,
    CwLimit,
    OverTemp,
    InternalVoltage,
    OverVoltage,
    UnderVoltage,
    OverCurrent,
    OpenMotorWinding,
    BadEncoder,
    CommError,
    BadFlash,
    NoMove,
    BlankQSegment,
}

impl AlarmCode {
    /// 已定义的报警码
    pub const ALL: [AlarmCode; 14] = [
        AlarmCode::PositionLimit,
        AlarmCode::CcwLimit,
        AlarmCode::CwLimit,
        AlarmCode::OverTemp,
        AlarmCode::InternalVoltage,
        AlarmCode::OverVoltage,
        AlarmCode::UnderVoltage,
        AlarmCode::OverCurrent,
        AlarmCode::OpenMotorWinding,
        AlarmCode::BadEncoder,
        AlarmCode::CommError,
        AlarmCode::BadFlash,
        AlarmCode::NoMove,
        AlarmCode::BlankQSegment,
    ];

    /// 位号（Bit 13 / 15 保留，不对应任何报警码）
    pub fn bit(self) -> usize {
        match self {
            AlarmCode::PositionLimit => 0,
            AlarmCode::CcwLimit => 1,
            AlarmCode::CwLimit => 2,
            AlarmCode::OverTemp => 3,
            AlarmCode::InternalVoltage => 4,
            AlarmCode::OverVoltage => 5,
            AlarmCode::UnderVoltage => 6,
            AlarmCode::OverCurrent => 7,
            AlarmCode::OpenMotorWinding => 8,
            AlarmCode::BadEncoder => 9,
            AlarmCode::CommError => 10,
            AlarmCode::BadFlash => 11,
            AlarmCode::NoMove => 12,
            AlarmCode::BlankQSegment => 14,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AlarmCode::PositionLimit => "Position Limit",
            AlarmCode::CcwLimit => "CCW Limit",
            AlarmCode::CwLimit => "CW Limit",
            AlarmCode::OverTemp => "Over Temp",
            AlarmCode::InternalVoltage => "Internal Voltage",
            AlarmCode::OverVoltage => "Over Voltage",
            AlarmCode::UnderVoltage => "Under Voltage",
            AlarmCode::OverCurrent => "Over Current",
            AlarmCode::OpenMotorWinding => "Open Motor Winding",
            AlarmCode::BadEncoder => "Bad Encoder",
            AlarmCode::CommError => "Comm Error",
            AlarmCode::BadFlash => "Bad Flash",
            AlarmCode::NoMove => "No Move",
            AlarmCode::BlankQSegment => "Blank Q Segment",
        }
    }
}

/// 报警查询结果
///
/// 全零寄存器必须报告为 `NoAlarm`，与"有报警但位未定义"区分开。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmReport {
    /// 寄存器全零
    NoAlarm,
    /// 存在报警
    Active {
        /// 已识别的报警码（按位号从高到低）
        codes: Vec<AlarmCode>,
        /// 未识别（保留位）的原始位
        unrecognized_bits: u16,
    },
}

impl AlarmReport {
    pub fn is_alarm(&self) -> bool {
        !matches!(self, AlarmReport::NoAlarm)
    }
}

impl AlarmFlags {
    /// 从寄存器原始值构建
    pub fn from_raw(raw: u16) -> Self {
        AlarmFlags::from(u16::new(raw))
    }

    /// 从 16 位二进制串解码
    pub fn decode(bits: &str) -> Result<Self, ProtocolError> {
        parse_bit_string(bits).map(Self::from_raw)
    }

    /// 寄存器原始值
    pub fn raw(&self) -> u16 {
        u16::from(*self)
    }

    /// 是否存在任何报警位
    pub fn is_alarm_present(&self) -> bool {
        self.raw() != 0
    }

    pub fn contains(&self, code: AlarmCode) -> bool {
        self.raw() & (1 << code.bit()) != 0
    }

    /// 未对应报警码的置位（保留位）
    pub fn unrecognized_bits(&self) -> u16 {
        let known = AlarmCode::ALL.iter().fold(0u16, |mask, c| mask | (1 << c.bit()));
        self.raw() & !known
    }

    /// 生成报警报告
    pub fn report(&self) -> AlarmReport {
        if !self.is_alarm_present() {
            return AlarmReport::NoAlarm;
        }
        let codes = AlarmCode::ALL.iter().rev().copied().filter(|c| self.contains(*c)).collect();
        AlarmReport::Active {
            codes,
            unrecognized_bits: self.unrecognized_bits(),
        }
    }

    /// 二进制串表示
    pub fn bit_string(&self) -> String {
        bit_string(self.raw())
    }
}
