//! # 电源继电器
//!
//! 驱动器的供电由网络继电器控制，继电器通过外部脚本操作：
//!
//! - `lnrelay-eth.sh <index> ON|OFF`：标准输出为返回码，`0` 表示成功
//! - `lnrelay-check.sh <index>`：第一行 `ON`/`OFF`，第二行返回码
//!
//! 任何失败（脚本缺失、返回码非零、输出无法识别）都是错误，不会被当作"已断电"。

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 开关脚本名
pub const SWITCH_SCRIPT: &str = "lnrelay-eth.sh";
/// 状态脚本名
pub const CHECK_SCRIPT: &str = "lnrelay-check.sh";

/// 继电器错误
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay script not found: {0}")]
    ScriptMissing(PathBuf),

    #[error("Failed to run relay script {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Relay script {script} failed with code {code}")]
    Failed { script: PathBuf, code: i64 },

    #[error("Relay script {script} gave unexpected output {output:?}")]
    UnexpectedOutput { script: PathBuf, output: String },
}

/// 电源继电器
pub trait PowerRelay: Send {
    fn power_on(&mut self) -> Result<(), RelayError>;
    fn power_off(&mut self) -> Result<(), RelayError>;
    /// 当前是否通电
    fn check_status(&mut self) -> Result<bool, RelayError>;
}

/// 调用外部脚本的继电器
#[derive(Debug, Clone)]
pub struct ScriptRelay {
    script_dir: PathBuf,
    index: u8,
    interpreter: Option<PathBuf>,
}

impl ScriptRelay {
    /// # 参数
    /// - `script_dir`: 脚本所在目录
    /// - `index`: 继电器通道号
    pub fn new(script_dir: impl Into<PathBuf>, index: u8) -> Self {
        Self {
            script_dir: script_dir.into(),
            index,
            interpreter: None,
        }
    }

    /// 使用解释器运行脚本（如 `sh`），脚本无需可执行权限
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    fn script_path(&self, name: &str) -> PathBuf {
        self.script_dir.join(name)
    }

    fn run(&self, script: &Path, args: &[&str]) -> Result<String, RelayError> {
        if !script.exists() {
            return Err(RelayError::ScriptMissing(script.to_path_buf()));
        }

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(script);
                c
            },
            None => Command::new(script),
        };
        command.arg(self.index.to_string()).args(args);
        debug!(script = %script.display(), index = self.index, ?args, "Running relay script");

        let output = command.output().map_err(|source| RelayError::Spawn {
            script: script.to_path_buf(),
            source,
        })?;

        if !output.status.success() {
            return Err(RelayError::Failed {
                script: script.to_path_buf(),
                code: output.status.code().map(i64::from).unwrap_or(-1),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_code(script: &Path, text: &str) -> Result<i64, RelayError> {
        text.trim().parse::<i64>().map_err(|_| RelayError::UnexpectedOutput {
            script: script.to_path_buf(),
            output: text.to_string(),
        })
    }

    fn switch(&self, state: &str) -> Result<(), RelayError> {
        let script = self.script_path(SWITCH_SCRIPT);
        let output = self.run(&script, &[state])?;
        let code = Self::parse_code(&script, &output)?;
        if code != 0 {
            warn!(script = %script.display(), code, "Relay switch script reported an error");
            return Err(RelayError::Failed { script, code });
        }
        info!(index = self.index, state, "Relay switched");
        Ok(())
    }
}

impl PowerRelay for ScriptRelay {
    fn power_on(&mut self) -> Result<(), RelayError> {
        self.switch("ON")
    }

    fn power_off(&mut self) -> Result<(), RelayError> {
        self.switch("OFF")
    }

    fn check_status(&mut self) -> Result<bool, RelayError> {
        let script = self.script_path(CHECK_SCRIPT);
        let output = self.run(&script, &[])?;
        let mut lines = output.lines();
        let state = lines.next().map(str::trim).unwrap_or_default();
        let code = Self::parse_code(&script, lines.next().unwrap_or_default())?;
        if code != 0 {
            return Err(RelayError::Failed { script, code });
        }

        match state {
            "ON" => Ok(true),
            "OFF" => Ok(false),
            _ => Err(RelayError::UnexpectedOutput {
                script,
                output,
            }),
        }
    }
}

/// 内存继电器
///
/// 记录开关顺序，不操作任何硬件。
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    powered: bool,
    history: Vec<bool>,
    fail: bool,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的所有操作都返回错误
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// 开关历史（true = 通电）
    pub fn history(&self) -> &[bool] {
        &self.history
    }

    fn set(&mut self, on: bool) -> Result<(), RelayError> {
        if self.fail {
            return Err(RelayError::Failed {
                script: PathBuf::from("memory"),
                code: 1,
            });
        }
        self.powered = on;
        self.history.push(on);
        Ok(())
    }
}

impl PowerRelay for MemoryRelay {
    fn power_on(&mut self) -> Result<(), RelayError> {
        self.set(true)
    }

    fn power_off(&mut self) -> Result<(), RelayError> {
        self.set(false)
    }

    fn check_status(&mut self) -> Result<bool, RelayError> {
        if self.fail {
            return Err(RelayError::Failed {
                script: PathBuf::from("memory"),
                code: 1,
            });
        }
        Ok(self.powered)
    }
}

impl<T: PowerRelay + ?Sized> PowerRelay for Box<T> {
    fn power_on(&mut self) -> Result<(), RelayError> {
        (**self).power_on()
    }

    fn power_off(&mut self) -> Result<(), RelayError> {
        (**self).power_off()
    }

    fn check_status(&mut self) -> Result<bool, RelayError> {
        (**self).check_status()
    }
}
