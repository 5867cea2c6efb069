//! 执行器驱动状态机
//!
//! `Disconnected → Connecting → Connected{enabled} → Moving → Connected`
//!
//! 同一时刻只有一条命令在途：所有操作都取 `&mut self`，由借用检查保证串行。
//! 运动完成靠轮询状态寄存器的运动位判断；轮询应答无法解析时，
//! 退化为按估算时间等待，并且不再轮询。

use crate::config::DriverConfig;
use crate::error::{BootStage, DriverError};
use crate::kind::ActuatorKind;
use crate::record::PersistedRecord;
use crate::state::{ActuatorSnapshot, ActuatorState, ConnectionState, TravelLimits};
use crate::target::MoveTarget;
use crate::units::{MAX_DEVICE_STEPS, within_device_range};
use std::fmt;
use std::thread;
use std::time::Duration;
use stepper_protocol::{
    AlarmFlags, AlarmReport, Command, MIN_RESOLUTION, Resolution, ResolutionTable, StatusFlags,
    parse_position, parse_register, probe_echo_contains, probe_echo_matches,
};
use stepper_serial::{Reply, SerialAdapter, SerialConfig, SerialPortAdapter};
use stepper_tools::{PositionRecoveryLog, PowerRelay};
use tracing::{debug, error, info, trace, warn};

/// 运动完成方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// 轮询到运动位清零
    Polled { polls: u32 },
    /// 状态无法解析，按估算时间等待
    TimedFallback { waited: Duration },
}

/// 一次运动的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveReport {
    /// 请求的目标（逻辑单位）
    pub target: f64,
    /// 实际发送的步数
    pub steps: i64,
    /// 量化误差（逻辑单位）
    pub quantization_error: f64,
    pub completion: Completion,
}

/// 直线轴回零结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingReport {
    /// 两端限位开关之间的步数
    pub travel_steps: i64,
    pub steps_per_mm: f64,
    pub limits: TravelLimits,
    /// 回零后停到上限位的运动
    pub parked: MoveReport,
}

/// 从日志恢复的结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Restored(PersistedRecord),
    /// 没有历史记录，使用默认值
    Defaulted,
}

/// 启动流程的结果
#[derive(Debug, Default)]
pub struct StartupReport {
    /// 首次启动失败的原因（未尝试或成功时为 None）
    pub first_boot_error: Option<DriverError>,
    pub first_boot_attempted: bool,
    pub booted: bool,
    pub restored: bool,
    /// 已连接时的电机使能状态
    pub motor_enabled: Option<bool>,
}

/// 步进执行器驱动
///
/// 独占串口、恢复日志与继电器；不同执行器之间完全独立，可以放在不同线程。
pub struct ActuatorDriver {
    name: String,
    config: DriverConfig,
    table: ResolutionTable,
    state: ActuatorState,
    transport: Option<Box<dyn SerialAdapter>>,
    log: Box<dyn PositionRecoveryLog>,
    relay: Box<dyn PowerRelay>,
}

impl fmt::Debug for ActuatorDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorDriver")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("connected", &self.transport.is_some())
            .finish()
    }
}

fn boot_error(stage: BootStage, reason: impl fmt::Display) -> DriverError {
    DriverError::Boot {
        stage,
        reason: reason.to_string(),
    }
}

impl ActuatorDriver {
    /// 创建驱动
    ///
    /// # 参数
    /// - `transport`: 已打开的串口；为 None 时处于未连接状态，可稍后 `set_port`
    /// - `port`: 端口标识（记录到日志中）
    /// - `gearing`: 旋转轴减速比或直线轴每毫米步数
    pub fn new(
        name: impl Into<String>,
        kind: ActuatorKind,
        port: impl Into<String>,
        config: DriverConfig,
        transport: Option<Box<dyn SerialAdapter>>,
        log: Box<dyn PositionRecoveryLog>,
        relay: Box<dyn PowerRelay>,
    ) -> Self {
        let table = ResolutionTable::standard();
        let resolution = table.nearest(config.default_resolution);
        let (low, high) = config.default_limits(kind);
        let state = ActuatorState::new(
            kind,
            port,
            resolution.steps_per_rev,
            config.gear_ratio,
            config.default_steps_per_mm,
            TravelLimits::new(low, high),
        );
        Self {
            name: name.into(),
            config,
            table,
            state,
            transport,
            log,
            relay,
        }
    }

    // ------------------------------------------------------------------
    // 访问器
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActuatorKind {
        self.state.kind
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn state(&self) -> &ActuatorState {
        &self.state
    }

    /// 逻辑位置（度或毫米）
    pub fn position(&self) -> f64 {
        self.state.position
    }

    /// 对设备步数计数器的判断
    pub fn position_steps(&self) -> i64 {
        self.state.position_steps
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.state.steps_per_rev
    }

    pub fn limits(&self) -> TravelLimits {
        self.state.limits
    }

    pub fn port(&self) -> &str {
        &self.state.port
    }

    pub fn is_booted(&self) -> bool {
        self.state.booted
    }

    /// 缓存的使能状态
    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection
    }

    /// 串口是否已打开
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// 当前状态对应的记录
    pub fn record(&self) -> PersistedRecord {
        PersistedRecord {
            kind: self.state.kind,
            timestamp: None,
            position: self.state.position,
            position_steps: self.state.position_steps,
            steps_per_rev: self.state.steps_per_rev,
            steps_per_mm: match self.state.kind {
                ActuatorKind::Linear => Some(self.state.steps_per_mm),
                ActuatorKind::Rotational => None,
            },
            accumulated_error: self.state.accumulated_error,
            previous_move_steps: self.state.previous_move_steps,
            lower_limit: self.state.limits.lower,
            upper_limit: self.state.limits.upper,
            port: self.state.port.clone(),
        }
    }

    /// 状态快照
    pub fn snapshot(&self) -> ActuatorSnapshot {
        ActuatorSnapshot {
            name: self.name.clone(),
            kind: self.state.kind,
            port: self.state.port.clone(),
            booted: self.state.booted,
            enabled: self.state.enabled,
            connection: self.state.connection,
            position: self.state.position,
            position_steps: self.state.position_steps,
            steps_per_rev: self.state.steps_per_rev,
            steps_per_mm: match self.state.kind {
                ActuatorKind::Linear => Some(self.state.steps_per_mm),
                ActuatorKind::Rotational => None,
            },
            limits: self.state.limits,
            accumulated_error: self.state.accumulated_error,
        }
    }

    // ------------------------------------------------------------------
    // 串口收发
    // ------------------------------------------------------------------

    fn channel(&mut self) -> Result<&mut dyn SerialAdapter, DriverError> {
        match self.transport.as_deref_mut() {
            Some(channel) => Ok(channel),
            None => Err(DriverError::NotConnected(self.name.clone())),
        }
    }

    fn send(&mut self, command: &Command) -> Result<(), DriverError> {
        self.channel()?.write_command(command)?;
        Ok(())
    }

    fn query(&mut self, command: &Command) -> Result<Reply, DriverError> {
        let window = self.config.reply_window;
        Ok(self.channel()?.query(command, window)?)
    }

    fn query_text(&mut self, command: &Command) -> Result<String, DriverError> {
        let reply = self.query(command)?;
        match reply.as_text() {
            Some(text) => Ok(text.to_string()),
            None => Err(DriverError::UndecodableReply {
                command: command.to_string(),
                hex: reply.to_hex(),
            }),
        }
    }

    fn read_status(&mut self) -> Result<StatusFlags, DriverError> {
        let text = self.query_text(&Command::QueryStatus)?;
        let status = StatusFlags::from_raw(parse_register(&text)?);
        trace!(actuator = %self.name, bits = %status.bit_string(), "status");
        Ok(status)
    }

    fn settle_connection(&mut self) {
        if self.state.connection.is_connected() {
            self.state.connection = ConnectionState::Connected {
                enabled: self.state.enabled,
            };
        }
    }

    // ------------------------------------------------------------------
    // 连接与启动
    // ------------------------------------------------------------------

    /// 发送探测命令，应答必须恰好为 `FOO`
    pub fn probe(&mut self) -> Result<(), DriverError> {
        let reply = self.query(&Command::Probe)?;
        if reply.as_text().is_some_and(probe_echo_matches) {
            Ok(())
        } else {
            Err(DriverError::ProbeMismatch {
                reply: reply.to_string(),
            })
        }
    }

    /// 连接检查：发送 `SSFOO`，应答必须恰好为 `FOO`
    ///
    /// 幂等；失败不会返回错误，只更新 `booted`。
    pub fn check_connect(&mut self) -> bool {
        self.state.connection = ConnectionState::Connecting;
        let ok = match self.probe() {
            Ok(()) => true,
            Err(e @ DriverError::ProbeMismatch { .. }) => {
                warn!(actuator = %self.name, error = %e, "Probe reply mismatch");
                false
            },
            Err(e) => {
                warn!(
                    actuator = %self.name,
                    error = %e,
                    "Serial connection is not open, check that the port is valid"
                );
                false
            },
        };

        self.state.booted = ok;
        self.state.connection = if ok {
            ConnectionState::Connected {
                enabled: self.state.enabled,
            }
        } else {
            ConnectionState::Disconnected
        };
        debug!(actuator = %self.name, booted = ok, "Connection check");
        ok
    }

    /// 首次启动：断电重启并写入驱动器参数
    ///
    /// 任一阶段失败立即返回，错误中包含阶段名与需要检查的前提条件；不重试。
    pub fn first_boot(&mut self) -> Result<(), DriverError> {
        info!(actuator = %self.name, "Attempting first boot");

        self.relay
            .power_off()
            .map_err(|e| boot_error(BootStage::PowerOff, e))?;
        thread::sleep(self.config.power_cycle_delay());
        self.relay
            .power_on()
            .map_err(|e| boot_error(BootStage::PowerOn, e))?;
        // 模式键必须在上电后 2ms~2s 内到达
        thread::sleep(self.config.mode_key_delay());

        self.send(&Command::ModeKey)
            .map_err(|e| boot_error(BootStage::ModeKey, e))?;
        let reply = self
            .query(&Command::Probe)
            .map_err(|e| boot_error(BootStage::Probe, e))?;
        if !reply.as_text().is_some_and(probe_echo_contains) {
            return Err(boot_error(
                BootStage::Probe,
                format!("motor did not acknowledge SCL mode, got {:?}", reply.to_string()),
            ));
        }

        let setup = [
            Command::PowerMode(2),
            Command::DefineLimits(self.state.kind.limit_input()),
            Command::Protocol(1),
            Command::ImmediateFormatDecimal,
            Command::CommandMode(21),
            Command::Acceleration(self.config.acceleration),
            Command::Deceleration(self.config.deceleration),
            Command::SaveParameters,
            Command::SetPosition(0),
        ];
        for command in &setup {
            self.send(command)
                .map_err(|e| boot_error(BootStage::Configure, format!("{}: {}", command, e)))?;
        }
        self.state.position_steps = 0;

        if !self.check_connect() {
            return Err(boot_error(
                BootStage::Verify,
                "probe after configuration did not echo FOO",
            ));
        }
        info!(actuator = %self.name, "First boot complete");
        Ok(())
    }

    /// 启动流程
    ///
    /// `fresh_log` 为 true（日志新建）时先尝试首次启动并写入表头；
    /// 随后检查连接、从日志恢复状态、读取电机使能状态。首次启动失败不会中止流程。
    pub fn startup(&mut self, fresh_log: bool) -> Result<StartupReport, DriverError> {
        let mut report = StartupReport::default();

        if fresh_log {
            report.first_boot_attempted = true;
            if let Err(e) = self.first_boot() {
                error!(actuator = %self.name, error = %e, "First boot failed");
                report.first_boot_error = Some(e);
            }
            self.write_log_header()?;
        }

        report.booted = self.check_connect();
        report.restored = matches!(self.load_from_log()?, LoadOutcome::Restored(_));

        if report.booted {
            match self.is_motor_on() {
                Ok(enabled) => report.motor_enabled = Some(enabled),
                Err(e) => warn!(actuator = %self.name, error = %e, "Could not read motor status"),
            }
        }
        Ok(report)
    }

    /// 更换串口并重新初始化通道
    pub fn set_port(&mut self, path: &str) -> Result<(), DriverError> {
        self.close();
        self.state.port = path.to_string();

        let config = SerialConfig::new(path)
            .baud_rate(self.config.baud_rate)
            .read_timeout(self.config.read_timeout());
        match SerialPortAdapter::open(&config) {
            Ok(adapter) => {
                self.transport = Some(Box::new(adapter));
                Ok(())
            },
            Err(e) => {
                warn!(
                    actuator = %self.name,
                    port = path,
                    "Failed to initialize serial connection, check that the port exists and is valid"
                );
                Err(e.into())
            },
        }
    }

    /// 使用指定的串口适配器替换当前通道
    pub fn replace_transport(&mut self, transport: Box<dyn SerialAdapter>) {
        self.close();
        self.state.port = transport.port_name().to_string();
        self.transport = Some(transport);
    }

    /// 关闭串口
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!(actuator = %self.name, "Serial channel closed");
        }
        self.state.booted = false;
        self.state.connection = ConnectionState::Disconnected;
    }

    /// 关闭串口并断开继电器电源
    pub fn shutdown(&mut self) -> Result<(), DriverError> {
        info!(actuator = %self.name, "Shutting down");
        self.close();
        self.relay.power_off()?;
        Ok(())
    }

    /// 继电器当前是否通电
    pub fn power_status(&mut self) -> Result<bool, DriverError> {
        Ok(self.relay.check_status()?)
    }

    // ------------------------------------------------------------------
    // 状态查询
    // ------------------------------------------------------------------

    /// 查询设备步数计数器（`SP`）
    pub fn query_position_steps(&mut self) -> Result<i64, DriverError> {
        let text = self.query_text(&Command::QueryPosition)?;
        Ok(parse_position(&text)?)
    }

    /// 设备步数是否与记录一致
    pub fn validate_position(&mut self) -> Result<bool, DriverError> {
        let actual = self.query_position_steps()?;
        if actual != self.state.position_steps {
            error!(
                actuator = %self.name,
                expected = self.state.position_steps,
                actual,
                "Severe error! Actuator may be in a different position than expected"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// 电机是否使能（状态寄存器 Bit 0）
    pub fn is_motor_on(&mut self) -> Result<bool, DriverError> {
        let enabled = self.read_status()?.is_enabled();
        self.state.enabled = enabled;
        self.settle_connection();
        if !enabled {
            warn!(actuator = %self.name, "Motor is not enabled");
        }
        Ok(enabled)
    }

    /// 读取并报告状态寄存器
    pub fn get_status(&mut self) -> Result<StatusFlags, DriverError> {
        let status = self.read_status()?;
        info!(actuator = %self.name, bits = %status.bit_string(), "Status");
        for flag in status.asserted() {
            info!(actuator = %self.name, "{}", flag.description());
        }
        Ok(status)
    }

    /// 读取并报告报警寄存器
    pub fn get_alarm(&mut self) -> Result<AlarmReport, DriverError> {
        let text = self.query_text(&Command::QueryAlarm)?;
        let alarm = AlarmFlags::from_raw(parse_register(&text)?);
        let report = alarm.report();
        match &report {
            AlarmReport::NoAlarm => info!(actuator = %self.name, "No alarm"),
            AlarmReport::Active {
                codes,
                unrecognized_bits,
            } => {
                for code in codes {
                    warn!(actuator = %self.name, "{}", code.description());
                }
                if *unrecognized_bits != 0 {
                    warn!(
                        actuator = %self.name,
                        bits = %format!("{:016b}", unrecognized_bits),
                        "Unrecognized alarm bits"
                    );
                }
            },
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // 设备控制
    // ------------------------------------------------------------------

    /// 电机使能 / 失能
    pub fn motor_enable(&mut self, enable: bool) -> Result<(), DriverError> {
        let command = if enable {
            Command::MotorEnable
        } else {
            Command::MotorDisable
        };
        info!(actuator = %self.name, enable, "Set motor enable");
        self.send(&command)?;
        self.state.enabled = enable;
        self.settle_connection();
        Ok(())
    }

    /// 清除报警
    pub fn clear_alarm(&mut self) -> Result<(), DriverError> {
        self.send(&Command::AlarmReset)
    }

    /// 原样发送命令（不做任何限位检查）
    pub fn send_raw(&mut self, command: &str) -> Result<(), DriverError> {
        warn!(
            actuator = %self.name,
            command,
            "Raw command bypasses software limits"
        );
        self.send(&Command::Raw(command.trim().to_string()))
    }

    /// 原样发送命令并读取应答窗口
    pub fn query_raw(&mut self, command: &str) -> Result<Reply, DriverError> {
        warn!(
            actuator = %self.name,
            command,
            "Raw command bypasses software limits"
        );
        self.query(&Command::Raw(command.trim().to_string()))
    }

    /// 读取一个应答窗口（不发送命令）
    pub fn read_pending(&mut self) -> Result<Reply, DriverError> {
        let window = self.config.reply_window;
        Ok(self.channel()?.read_reply(window)?)
    }

    // ------------------------------------------------------------------
    // 运动
    // ------------------------------------------------------------------

    fn check_limits(&self, target: f64) -> Result<(), DriverError> {
        if !target.is_finite() {
            return Err(DriverError::InvalidArgument(format!(
                "target {} is not a finite position",
                target
            )));
        }
        let limits = self.state.limits;
        if !limits.contains(target) {
            warn!(
                actuator = %self.name,
                target,
                lower = limits.lower,
                upper = limits.upper,
                "Move would put it out of range"
            );
            return Err(DriverError::OutOfRange {
                target,
                lower: limits.lower,
                upper: limits.upper,
            });
        }
        Ok(())
    }

    /// 运动前的实时检查：步数一致且电机使能
    fn check_ready(&mut self) -> Result<(), DriverError> {
        let actual = self.query_position_steps()?;
        if actual != self.state.position_steps {
            error!(
                actuator = %self.name,
                expected = self.state.position_steps,
                actual,
                "Move not executed: actuator may be in a different position than expected"
            );
            return Err(DriverError::PositionMismatch {
                expected: self.state.position_steps,
                actual,
            });
        }
        if !self.is_motor_on()? {
            return Err(DriverError::MotorDisabled);
        }
        Ok(())
    }

    /// 发送速度与步数，等待运动结束
    fn feed(&mut self, steps: i64) -> Result<Completion, DriverError> {
        self.send(&Command::Velocity(self.state.kind.velocity()))?;
        self.send(&Command::FeedToLength(steps))?;
        self.state.connection = ConnectionState::Moving;

        let completion = self.wait_for_motion(steps);
        self.state.connection = ConnectionState::Connected {
            enabled: self.state.enabled,
        };
        Ok(completion)
    }

    fn wait_for_motion(&mut self, steps: i64) -> Completion {
        let mut polls = 0;
        loop {
            polls += 1;
            match self.read_status() {
                Ok(status) if status.is_moving() => {
                    trace!(actuator = %self.name, polls, "Moving...");
                },
                Ok(_) => return Completion::Polled { polls },
                Err(e) => {
                    let waited = self.state.converter().estimated_duration(steps);
                    warn!(
                        actuator = %self.name,
                        error = %e,
                        wait_ms = waited.as_millis() as u64,
                        "Status reply could not be decoded, falling back to estimated wait"
                    );
                    thread::sleep(waited);
                    return Completion::TimedFallback { waited };
                },
            }
        }
    }

    fn execute_move(&mut self, target: f64, delta: f64) -> Result<MoveReport, DriverError> {
        self.check_limits(target)?;

        let converter = self.state.converter();
        let unit = self.state.kind.unit();
        let steps = converter.to_steps(delta).ok_or_else(|| {
            DriverError::InvalidArgument(format!(
                "move of {} {} exceeds the drive range of {} steps",
                delta, unit, MAX_DEVICE_STEPS
            ))
        })?;
        let position_steps = self
            .state
            .position_steps
            .checked_add(steps)
            .filter(|&s| within_device_range(s))
            .ok_or_else(|| {
                DriverError::InvalidArgument(format!(
                    "move of {} steps from {} leaves the drive counter range",
                    steps, self.state.position_steps
                ))
            })?;
        self.check_ready()?;

        let quantization_error = converter.quantization_error(steps, delta);
        info!(
            actuator = %self.name,
            target,
            steps,
            quantization_error,
            unit,
            "Moving"
        );

        let completion = self.feed(steps)?;

        self.state.position = target;
        self.state.position_steps = position_steps;
        self.state.previous_move_steps = steps;
        self.state.accumulated_error += quantization_error;
        self.make_log_entry()?;
        info!(actuator = %self.name, ?completion, "Move finished");

        if let Err(e) = self.validate_position() {
            warn!(actuator = %self.name, error = %e, "Could not verify position after move");
        }

        Ok(MoveReport {
            target,
            steps,
            quantization_error,
            completion,
        })
    }

    /// 相对运动
    ///
    /// # 错误
    /// - `OutOfRange`: 目标超出软件限位（不发送任何命令）
    /// - `PositionMismatch` / `MotorDisabled`: 实时检查失败（不发送运动命令）
    pub fn move_relative(&mut self, delta: f64) -> Result<MoveReport, DriverError> {
        let target = self.state.position + delta;
        self.execute_move(target, delta)
    }

    /// 绝对运动
    pub fn move_absolute(&mut self, target: f64) -> Result<MoveReport, DriverError> {
        let delta = target - self.state.position;
        self.execute_move(target, delta)
    }

    /// 运动到 `IN` / `OUT`（直线轴软件下限 / 上限）或绝对位置
    pub fn move_to(&mut self, target: MoveTarget) -> Result<MoveReport, DriverError> {
        match (target, self.state.kind) {
            (MoveTarget::Absolute(value), _) => self.move_absolute(value),
            (MoveTarget::In, ActuatorKind::Linear) => self.move_absolute(self.state.limits.lower),
            (MoveTarget::Out, ActuatorKind::Linear) => self.move_absolute(self.state.limits.upper),
            (MoveTarget::In | MoveTarget::Out, kind) => Err(DriverError::UnsupportedForKind {
                operation: "move IN/OUT",
                kind,
            }),
        }
    }

    // ------------------------------------------------------------------
    // 标定与参数
    // ------------------------------------------------------------------

    /// 标定
    ///
    /// - 旋转轴：`value` 为当前角度，必须在软件限位内；步数计数器清零
    /// - 直线轴：`value` 为物理行程（毫米），执行回零
    pub fn calibrate(&mut self, value: f64) -> Result<(), DriverError> {
        match self.state.kind {
            ActuatorKind::Rotational => {
                if !self.state.limits.contains(value) || !value.is_finite() {
                    warn!(actuator = %self.name, value, "Calibration must be inside the limits");
                    return Err(DriverError::OutOfRange {
                        target: value,
                        lower: self.state.limits.lower,
                        upper: self.state.limits.upper,
                    });
                }
                self.send(&Command::SetPosition(0))?;
                self.state.position = value;
                self.state.position_steps = 0;
                info!(actuator = %self.name, value, "Setting current position");
                self.make_log_entry()
            },
            ActuatorKind::Linear => self.home(value).map(|_| ()),
        }
    }

    /// 直线轴回零
    ///
    /// 先退到收回端限位开关并清零计数器，再伸到伸出端，读取两端之间的步数，
    /// 据此计算每毫米步数；软件限位为两端各内缩 `homing_margin_mm`，最后停到上限位。
    pub fn home(&mut self, span_mm: f64) -> Result<HomingReport, DriverError> {
        if self.state.kind != ActuatorKind::Linear {
            return Err(DriverError::UnsupportedForKind {
                operation: "homing",
                kind: self.state.kind,
            });
        }
        let margin = self.config.homing_margin_mm;
        if !span_mm.is_finite() || span_mm <= 2.0 * margin {
            return Err(DriverError::InvalidArgument(format!(
                "span {} mm must exceed twice the homing margin ({} mm)",
                span_mm, margin
            )));
        }

        let seek = self.config.homing_seek_steps;
        info!(actuator = %self.name, span_mm, "Homing: seeking retracted end");
        self.feed(-seek)?;
        self.send(&Command::AlarmReset)?;
        self.send(&Command::SetPosition(0))?;

        info!(actuator = %self.name, "Homing: seeking extended end");
        self.feed(seek)?;
        self.send(&Command::AlarmReset)?;

        let travel_steps = self.query_position_steps()?;
        if travel_steps <= 0 {
            return Err(DriverError::Homing(format!(
                "measured travel of {} steps",
                travel_steps
            )));
        }

        let steps_per_mm = travel_steps as f64 / span_mm;
        let limits = TravelLimits::new(margin, span_mm - margin);
        self.state.steps_per_mm = steps_per_mm;
        self.state.position_steps = travel_steps;
        self.state.position = span_mm;
        self.state.previous_move_steps = seek;
        self.state.limits = limits;
        self.make_log_entry()?;
        info!(
            actuator = %self.name,
            travel_steps,
            steps_per_mm,
            %limits,
            "Homing complete"
        );

        let parked = self.move_absolute(limits.upper)?;
        Ok(HomingReport {
            travel_steps,
            steps_per_mm,
            limits,
            parked,
        })
    }

    fn apply_resolution(&mut self, requested: u32) -> Result<Resolution, DriverError> {
        if requested < MIN_RESOLUTION {
            warn!(actuator = %self.name, requested, "Resolution must be at least {}", MIN_RESOLUTION);
            return Err(DriverError::InvalidResolution {
                requested,
                minimum: MIN_RESOLUTION,
            });
        }

        let resolution = self.table.nearest(requested);
        if self.transport.is_some() {
            self.send(&Command::MicrostepResolution(resolution.index))?;
        } else {
            debug!(actuator = %self.name, "Not connected, resolution applied locally");
        }

        let previous = self.state.steps_per_rev;
        if self.state.kind == ActuatorKind::Linear && previous != resolution.steps_per_rev {
            self.state.steps_per_mm *= f64::from(resolution.steps_per_rev) / f64::from(previous);
        }
        self.state.steps_per_rev = resolution.steps_per_rev;
        info!(
            actuator = %self.name,
            requested,
            steps_per_rev = resolution.steps_per_rev,
            index = resolution.index,
            "Set resolution"
        );
        Ok(resolution)
    }

    /// 设置细分：映射到驱动器支持的最近值并发送 `MR<index>`
    pub fn set_resolution(&mut self, requested: u32) -> Result<Resolution, DriverError> {
        let resolution = self.apply_resolution(requested)?;
        self.make_log_entry()?;
        Ok(resolution)
    }

    /// 设置软件限位（自动排序）；上下限相等时关闭范围检查
    pub fn set_limits(&mut self, low: f64, high: f64) -> Result<(), DriverError> {
        if !low.is_finite() || !high.is_finite() {
            return Err(DriverError::InvalidArgument(
                "limits must be finite".to_string(),
            ));
        }
        self.state.limits = TravelLimits::new(low, high);
        if self.state.limits.is_unbounded() {
            warn!(actuator = %self.name, "Limits are equal, this removes limits on movement");
        }
        self.make_log_entry()
    }

    // ------------------------------------------------------------------
    // 持久化
    // ------------------------------------------------------------------

    /// 追加当前状态记录
    pub fn make_log_entry(&mut self) -> Result<(), DriverError> {
        let line = self.record().to_line();
        self.log.append(&line)?;
        Ok(())
    }

    /// 写入日志表头
    pub fn write_log_header(&mut self) -> Result<(), DriverError> {
        self.log.write_header(PersistedRecord::header(self.state.kind))?;
        Ok(())
    }

    /// 从日志最后一条记录恢复状态
    ///
    /// 已连接时把恢复的步数写回设备；没有记录时使用默认细分并清零计数器。
    pub fn load_from_log(&mut self) -> Result<LoadOutcome, DriverError> {
        let online = self.state.booted && self.transport.is_some();

        let Some(line) = self.log.last().map(str::to_string) else {
            info!(actuator = %self.name, "No history in log, using defaults");
            if online {
                self.send(&Command::SetPosition(0))?;
            }
            self.state.position_steps = 0;
            self.apply_resolution(self.config.default_resolution)?;
            return Ok(LoadOutcome::Defaulted);
        };

        let record = PersistedRecord::parse(&line, self.state.kind)?;
        info!(
            actuator = %self.name,
            date = record.timestamp.as_deref().unwrap_or_default(),
            position = record.position,
            steps = record.position_steps,
            resolution = record.steps_per_rev,
            lower = record.lower_limit,
            upper = record.upper_limit,
            port = %record.port,
            "Loading position from log"
        );
        if record.port != self.state.port {
            warn!(
                actuator = %self.name,
                logged = %record.port,
                current = %self.state.port,
                "Port differs from the logged port"
            );
        }

        self.state.position = record.position;
        self.state.position_steps = record.position_steps;
        self.apply_resolution(record.steps_per_rev)?;
        if let Some(steps_per_mm) = record.steps_per_mm {
            self.state.steps_per_mm = steps_per_mm;
        }
        self.state.accumulated_error = record.accumulated_error;
        self.state.previous_move_steps = record.previous_move_steps;
        self.state.limits = TravelLimits::new(record.lower_limit, record.upper_limit);
        if self.state.limits.is_unbounded() {
            warn!(actuator = %self.name, "Limits are equal, this removes limits on movement");
        }

        if online {
            self.send(&Command::SetPosition(record.position_steps))?;
        }
        Ok(LoadOutcome::Restored(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepper_tools::{MemoryRecoveryLog, MemoryRelay};

    fn offline(kind: ActuatorKind) -> ActuatorDriver {
        ActuatorDriver::new(
            "offline",
            kind,
            "/dev/null",
            DriverConfig::default(),
            None,
            Box::new(MemoryRecoveryLog::new()),
            Box::new(MemoryRelay::new()),
        )
    }

    #[test]
    fn test_defaults() {
        let driver = offline(ActuatorKind::Rotational);
        assert_eq!(driver.steps_per_rev(), 2000);
        assert_eq!(driver.limits(), TravelLimits::new(0.0, 90.0));
        assert_eq!(driver.connection(), ConnectionState::Disconnected);
        assert!(!driver.is_booted());
    }

    #[test]
    fn test_offline_operations_report_not_connected() {
        let mut driver = offline(ActuatorKind::Rotational);
        assert!(!driver.check_connect());
        assert!(matches!(
            driver.query_position_steps(),
            Err(DriverError::NotConnected(_))
        ));
        assert!(matches!(
            driver.move_absolute(10.0),
            Err(DriverError::NotConnected(_))
        ));
    }

    #[test]
    fn test_out_of_range_checked_before_io() {
        let mut driver = offline(ActuatorKind::Rotational);
        assert!(matches!(
            driver.move_absolute(95.0),
            Err(DriverError::OutOfRange { .. })
        ));
        assert!(matches!(
            driver.move_relative(f64::NAN),
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_resolution_offline() {
        let mut driver = offline(ActuatorKind::Rotational);
        let res = driver.set_resolution(12000).unwrap();
        assert_eq!(res.steps_per_rev, 12800);
        assert_eq!(driver.steps_per_rev(), 12800);
        assert!(matches!(
            driver.set_resolution(199),
            Err(DriverError::InvalidResolution { .. })
        ));
    }

    #[test]
    fn test_linear_resolution_rescales_mm_scale() {
        let mut driver = offline(ActuatorKind::Linear);
        let before = driver.state().steps_per_mm;
        driver.set_resolution(20000).unwrap();
        assert!((driver.state().steps_per_mm - before * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_move_to_in_out_rotational_unsupported() {
        let mut driver = offline(ActuatorKind::Rotational);
        assert!(matches!(
            driver.move_to(MoveTarget::In),
            Err(DriverError::UnsupportedForKind { .. })
        ));
    }

    #[test]
    fn test_home_requires_linear() {
        let mut driver = offline(ActuatorKind::Rotational);
        assert!(matches!(
            driver.home(50.0),
            Err(DriverError::UnsupportedForKind { .. })
        ));
        let mut linear = offline(ActuatorKind::Linear);
        assert!(matches!(
            linear.home(3.0),
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_limits_sorted_and_persisted() {
        let mut driver = offline(ActuatorKind::Rotational);
        driver.set_limits(45.0, -45.0).unwrap();
        assert_eq!(driver.limits(), TravelLimits::new(-45.0, 45.0));
        assert!(driver.set_limits(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_shutdown_powers_off() {
        let mut driver = offline(ActuatorKind::Rotational);
        driver.shutdown().unwrap();
        assert!(!driver.power_status().unwrap());
        assert!(!driver.has_transport());
    }

    #[test]
    fn test_snapshot_row() {
        let driver = offline(ActuatorKind::Linear);
        let snapshot = driver.snapshot();
        assert_eq!(snapshot.steps_per_mm, Some(400.0));
        assert!(snapshot.to_string().starts_with("offline"));
        assert!(ActuatorSnapshot::header().starts_with("name"));
    }
}
