//! 应答解析
//!
//! 在 `PR1` 协议下，查询应答形如 `SC=0009\r`、`SP=-1200\r`：
//! 固定 3 字符前缀（命令名 + `=`）后跟十进制数字。

use crate::ProtocolError;
use crate::command::PROBE_TOKEN;

/// 应答前缀长度（如 `SC=`）
pub const REPLY_PREFIX_LEN: usize = 3;

/// 去掉固定前缀，返回剩余的数字部分（已去除空白）
fn strip_prefix(reply: &str) -> Result<&str, ProtocolError> {
    let trimmed = reply.trim();
    if trimmed.len() < REPLY_PREFIX_LEN || !trimmed.is_char_boundary(REPLY_PREFIX_LEN) {
        return Err(ProtocolError::ReplyTooShort {
            expected: REPLY_PREFIX_LEN,
            actual: trimmed.len(),
        });
    }
    Ok(trimmed[REPLY_PREFIX_LEN..].trim())
}

/// 解析 16 位寄存器应答（`SC` / `AL`）
///
/// # 错误
/// - 应答长度不足前缀
/// - 数字部分为空或含非十进制字符
/// - 数值超过 16 位
pub fn parse_register(reply: &str) -> Result<u16, ProtocolError> {
    let digits = strip_prefix(reply)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidDigits {
            reply: reply.to_string(),
        });
    }

    let value: u64 = digits.parse().map_err(|_| ProtocolError::InvalidDigits {
        reply: reply.to_string(),
    })?;
    u16::try_from(value).map_err(|_| ProtocolError::RegisterOverflow { value })
}

/// 解析位置应答（`SP`），允许负号
pub fn parse_position(reply: &str) -> Result<i64, ProtocolError> {
    let digits = strip_prefix(reply)?;
    digits.parse::<i64>().map_err(|_| ProtocolError::InvalidDigits {
        reply: reply.to_string(),
    })
}

/// 探测应答是否严格等于 `FOO`（连接检查使用）
pub fn probe_echo_matches(reply: &str) -> bool {
    reply.trim() == PROBE_TOKEN
}

/// 探测应答是否包含 `FOO`（首次启动时驱动器可能附带其他字符）
pub fn probe_echo_contains(reply: &str) -> bool {
    reply.trim().contains(PROBE_TOKEN)
}
