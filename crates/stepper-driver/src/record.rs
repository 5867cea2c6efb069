//! 持久化记录
//!
//! 一行逗号分隔的记录，时间戳由日志在写入时加在最前面：
//!
//! ```text
//! 旋转: timestamp, angle_deg, steps, spr, accumulated_error, previous_move, low_deg, high_deg, port
//! 直线: timestamp, position_mm, steps, spr, steps_per_mm, accumulated_error, previous_move, low_mm, high_mm, port
//! ```
//!
//! 浮点数保留 5 位小数。

use crate::kind::ActuatorKind;
use std::str::FromStr;
use thiserror::Error;

/// 记录解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("{kind} record has {actual} fields, expected {expected}")]
    FieldCount {
        kind: ActuatorKind,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} value {value:?}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub kind: ActuatorKind,
    /// 读入时的时间戳（新建记录为 None）
    pub timestamp: Option<String>,
    /// 逻辑位置（度或毫米）
    pub position: f64,
    pub position_steps: i64,
    pub steps_per_rev: u32,
    /// 仅直线轴
    pub steps_per_mm: Option<f64>,
    pub accumulated_error: f64,
    pub previous_move_steps: i64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub port: String,
}

impl PersistedRecord {
    /// 字段数（含时间戳）
    pub fn field_count(kind: ActuatorKind) -> usize {
        match kind {
            ActuatorKind::Rotational => 9,
            ActuatorKind::Linear => 10,
        }
    }

    /// 日志表头
    pub fn header(kind: ActuatorKind) -> &'static str {
        match kind {
            ActuatorKind::Rotational => {
                "date, angle(deg), pos(steps), res(spr), err(deg), prev(step), low(deg), high(deg), port"
            },
            ActuatorKind::Linear => {
                "date, pos(mm), pos(steps), res(spr), steps_per_mm, err(mm), prev(step), low(mm), high(mm), port"
            },
        }
    }

    /// 序列化为记录行（不含时间戳）
    pub fn to_line(&self) -> String {
        let head = format!(
            "{:.5}, {}, {}",
            self.position, self.position_steps, self.steps_per_rev
        );
        let scale = match (self.kind, self.steps_per_mm) {
            (ActuatorKind::Linear, Some(spm)) => format!(", {:.5}", spm),
            (ActuatorKind::Linear, None) => ", 0.00000".to_string(),
            (ActuatorKind::Rotational, _) => String::new(),
        };
        format!(
            "{}{}, {:.5}, {}, {:.5}, {:.5}, {}",
            head,
            scale,
            self.accumulated_error,
            self.previous_move_steps,
            self.lower_limit,
            self.upper_limit,
            self.port
        )
    }

    /// 解析日志中的一行（含时间戳）
    pub fn parse(line: &str, kind: ActuatorKind) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let expected = Self::field_count(kind);
        if fields.len() != expected {
            return Err(RecordError::FieldCount {
                kind,
                expected,
                actual: fields.len(),
            });
        }

        let mut cursor = Fields { fields: &fields, index: 0 };
        let timestamp = cursor.next_str().to_string();
        let position = cursor.parse("position")?;
        let position_steps = cursor.parse("position_steps")?;
        let steps_per_rev = cursor.parse("steps_per_rev")?;
        let steps_per_mm = match kind {
            ActuatorKind::Linear => Some(cursor.parse("steps_per_mm")?),
            ActuatorKind::Rotational => None,
        };
        let accumulated_error = cursor.parse("accumulated_error")?;
        let previous_move_steps = cursor.parse("previous_move_steps")?;
        let lower_limit = cursor.parse("lower_limit")?;
        let upper_limit = cursor.parse("upper_limit")?;
        let port = cursor.next_str().to_string();

        Ok(Self {
            kind,
            timestamp: Some(timestamp),
            position,
            position_steps,
            steps_per_rev,
            steps_per_mm,
            accumulated_error,
            previous_move_steps,
            lower_limit,
            upper_limit,
            port,
        })
    }
}

struct Fields<'a> {
    fields: &'a [&'a str],
    index: usize,
}

impl<'a> Fields<'a> {
    fn next_str(&mut self) -> &'a str {
        let field = self.fields.get(self.index).copied().unwrap_or_default();
        self.index += 1;
        field
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, RecordError> {
        let value = self.next_str();
        value.parse().map_err(|_| RecordError::InvalidField {
            field,
            value: value.to_string(),
        })
    }
}
