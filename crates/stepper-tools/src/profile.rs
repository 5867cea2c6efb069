//! # 执行器配置文件
//!
//! 每个执行器一个 `[[actuator]]` 表：
//!
//! ```toml
//! [[actuator]]
//! name = "FP1_R1"
//! kind = "R"
//! port = "/dev/ttyUSB0"
//! relay_index = 3
//! log = "FP1_R1.log"
//! ```
//!
//! 默认路径：`~/stepper/stepper.toml`。日志文件相对于配置文件所在目录。

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 继电器通道数
pub const RELAY_CHANNELS: i32 = 40;

const PLACEHOLDER_NAME: &str = "nobody";
const PLACEHOLDER_PORT: &str = "/dev/null";
const PLACEHOLDER_LOG: &str = "nobody.log";
const PLACEHOLDER_RELAY: i32 = -1;

/// 执行器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// 旋转（角度）
    #[serde(rename = "R")]
    Rotational,
    /// 直线（毫米）
    #[serde(rename = "L")]
    Linear,
}

/// 单个执行器的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorProfile {
    pub name: String,
    pub kind: ProfileKind,
    /// 串口路径
    pub port: String,
    /// 继电器通道（0..40）
    pub relay_index: i32,
    /// 恢复日志文件名
    pub log: String,
    /// 读超时（毫秒），缺省为 2000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

impl ActuatorProfile {
    /// 生成模板时使用的占位配置（不能直接使用）
    pub fn placeholder() -> Self {
        Self {
            name: PLACEHOLDER_NAME.to_string(),
            kind: ProfileKind::Rotational,
            port: PLACEHOLDER_PORT.to_string(),
            relay_index: PLACEHOLDER_RELAY,
            log: PLACEHOLDER_LOG.to_string(),
            read_timeout_ms: None,
        }
    }

    /// 校验配置
    ///
    /// # 参数
    /// - `check_port`: 是否要求串口路径存在
    ///
    /// # 错误
    /// - 任何字段仍是模板占位值
    /// - 继电器通道超出 0..40
    /// - 串口不存在（`check_port` 时）
    pub fn validate(&self, check_port: bool) -> Result<()> {
        if self.name.trim().is_empty() || self.name == PLACEHOLDER_NAME {
            bail!("Profile has placeholder name {:?}, edit the config first", self.name);
        }
        if self.port == PLACEHOLDER_PORT {
            bail!("Profile {} still uses placeholder port {}", self.name, self.port);
        }
        if self.log == PLACEHOLDER_LOG || self.log.trim().is_empty() {
            bail!("Profile {} has placeholder log {:?}", self.name, self.log);
        }
        if !(0..RELAY_CHANNELS).contains(&self.relay_index) {
            bail!(
                "Profile {} has relay index {} out of range 0..{}",
                self.name,
                self.relay_index,
                RELAY_CHANNELS
            );
        }
        if check_port && !Path::new(&self.port).exists() {
            bail!("Profile {} port {} not found", self.name, self.port);
        }
        Ok(())
    }

    /// 继电器通道（已校验时不会失败）
    pub fn relay_channel(&self) -> Result<u8> {
        u8::try_from(self.relay_index)
            .with_context(|| format!("Relay index {} is not a valid channel", self.relay_index))
    }

    /// 日志文件路径（相对路径按 `base_dir` 解析）
    pub fn log_path(&self, base_dir: &Path) -> PathBuf {
        let log = Path::new(&self.log);
        if log.is_absolute() {
            log.to_path_buf()
        } else {
            base_dir.join(log)
        }
    }
}

/// 配置文件内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(rename = "actuator", default)]
    pub actuators: Vec<ActuatorProfile>,
}

impl ProfileSet {
    /// 默认配置路径：`<home>/stepper/stepper.toml`
    pub fn default_path(home: &Path) -> PathBuf {
        home.join("stepper").join("stepper.toml")
    }

    /// 从 TOML 文本解析
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse actuator profiles")
    }

    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P, check_ports: bool) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let set = Self::parse(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        set.validate(check_ports)?;
        Ok(set)
    }

    /// 加载配置；不存在时写入模板并返回错误，提示先编辑
    pub fn load_or_create_template<P: AsRef<Path>>(path: P, check_ports: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            Self::write_template(path)?;
            bail!(
                "No config file found, generated a template at {}; edit it before continuing",
                path.display()
            );
        }
        Self::load(path, check_ports)
    }

    /// 写入模板配置
    pub fn write_template<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let template = ProfileSet {
            actuators: vec![ActuatorProfile::placeholder()],
        };
        let content = toml::to_string_pretty(&template).context("Failed to serialize template")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write template {}", path.display()))?;
        Ok(())
    }

    /// 校验所有配置，名字不能重复
    pub fn validate(&self, check_ports: bool) -> Result<()> {
        if self.actuators.is_empty() {
            bail!("No actuators configured");
        }
        let mut names = HashSet::new();
        for profile in &self.actuators {
            profile.validate(check_ports)?;
            if !names.insert(profile.name.as_str()) {
                bail!("Duplicate actuator name {}", profile.name);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ActuatorProfile> {
        self.actuators.iter().find(|p| p.name == name)
    }
}
