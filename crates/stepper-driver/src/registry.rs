//! 执行器注册表
//!
//! 按名称索引、保持插入顺序；由调用方持有，不是全局状态。

use crate::driver::ActuatorDriver;
use crate::error::DriverError;
use crate::state::ActuatorSnapshot;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ActuatorRegistry {
    actuators: Vec<ActuatorDriver>,
    /// 当前选中的执行器下标
    current: Option<usize>,
}

impl ActuatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.actuators.iter().position(|a| a.name() == name)
    }

    /// 注册执行器；第一个注册的执行器自动成为当前执行器
    pub fn insert(&mut self, driver: ActuatorDriver) -> Result<(), DriverError> {
        if self.position(driver.name()).is_some() {
            return Err(DriverError::DuplicateActuator(driver.name().to_string()));
        }
        self.actuators.push(driver);
        if self.current.is_none() {
            self.current = Some(0);
        }
        Ok(())
    }

    /// 移除执行器
    pub fn remove(&mut self, name: &str) -> Result<ActuatorDriver, DriverError> {
        let index = self
            .position(name)
            .ok_or_else(|| DriverError::UnknownActuator(name.to_string()))?;
        let driver = self.actuators.remove(index);
        self.current = match self.current {
            Some(current) if current == index => None,
            Some(current) if current > index => Some(current - 1),
            other => other,
        };
        Ok(driver)
    }

    pub fn get(&self, name: &str) -> Option<&ActuatorDriver> {
        self.actuators.iter().find(|a| a.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ActuatorDriver, DriverError> {
        self.actuators
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| DriverError::UnknownActuator(name.to_string()))
    }

    /// 切换当前执行器
    pub fn select(&mut self, name: &str) -> Result<&mut ActuatorDriver, DriverError> {
        let index = self
            .position(name)
            .ok_or_else(|| DriverError::UnknownActuator(name.to_string()))?;
        self.current = Some(index);
        info!(actuator = name, "Selected actuator");
        Ok(&mut self.actuators[index])
    }

    pub fn current(&self) -> Option<&ActuatorDriver> {
        self.current.and_then(|i| self.actuators.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut ActuatorDriver> {
        self.current.and_then(|i| self.actuators.get_mut(i))
    }

    /// 按注册顺序的名称
    pub fn names(&self) -> Vec<&str> {
        self.actuators.iter().map(ActuatorDriver::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActuatorDriver> {
        self.actuators.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActuatorDriver> {
        self.actuators.iter_mut()
    }

    pub fn snapshots(&self) -> Vec<ActuatorSnapshot> {
        self.actuators.iter().map(ActuatorDriver::snapshot).collect()
    }

    /// 状态表（表头 + 每个执行器一行）
    pub fn status_table(&self) -> String {
        let mut table = ActuatorSnapshot::header();
        for snapshot in self.snapshots() {
            table.push('\n');
            table.push_str(&snapshot.to_string());
        }
        table
    }

    /// 关闭所有执行器，返回失败的执行器及原因
    pub fn shutdown_all(&mut self) -> Vec<(String, DriverError)> {
        let mut failures = Vec::new();
        for driver in &mut self.actuators {
            if let Err(e) = driver.shutdown() {
                warn!(actuator = %driver.name(), error = %e, "Shutdown failed");
                failures.push((driver.name().to_string(), e));
            }
        }
        failures
    }
}
