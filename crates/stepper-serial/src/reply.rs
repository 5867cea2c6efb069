//! 应答窗口

use std::fmt;

/// 默认应答窗口（字节）
pub const REPLY_WINDOW: usize = 15;

/// 一次读取到的应答
///
/// 能按 UTF-8 解码时为文本，否则保留原始字节并以十六进制展示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Vec<u8>),
}

impl Reply {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Reply::Text(text),
            Err(e) => Reply::Binary(e.into_bytes()),
        }
    }

    /// 文本内容（二进制应答返回 None）
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            Reply::Binary(_) => None,
        }
    }

    /// 去除空白后的文本
    pub fn trimmed(&self) -> Option<&str> {
        self.as_text().map(str::trim)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Reply::Text(text) => text.trim().is_empty(),
            Reply::Binary(bytes) => bytes.is_empty(),
        }
    }

    pub fn to_hex(&self) -> String {
        match self {
            Reply::Text(text) => hex::encode(text.as_bytes()),
            Reply::Binary(bytes) => hex::encode(bytes),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Text(text) => write!(f, "{}", text.trim_end()),
            Reply::Binary(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}
