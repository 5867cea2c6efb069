//! # 位置恢复日志
//!
//! 每次改变状态的操作都会追加一行记录，启动时只读取最后一行。
//! 记录行以本地时间戳开头（`%Y-%m-%d/%H:%M:%S%z, `），表头行不是记录。

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 记录行时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d/%H:%M:%S%z";

/// 为记录加上当前本地时间戳
pub fn timestamped(line: &str) -> String {
    format!("{}, {}", Local::now().format(TIMESTAMP_FORMAT), line)
}

/// 是否为记录行（以时间戳的年份开头）
pub fn is_record_line(line: &str) -> bool {
    line.trim_start().starts_with(|c: char| c.is_ascii_digit())
}

/// 位置恢复日志
pub trait PositionRecoveryLog: Send {
    /// 追加一条记录（自动加时间戳）
    fn append(&mut self, line: &str) -> io::Result<()>;

    /// 写入表头（只应在日志新建时调用一次）
    fn write_header(&mut self, header: &str) -> io::Result<()>;

    /// 最后一条记录（不包括表头）
    fn last(&self) -> Option<&str>;

    /// 是否没有任何记录
    fn is_empty(&self) -> bool {
        self.last().is_none()
    }
}

/// 基于文件的恢复日志
///
/// 追加写入，每次写入后立即 flush；打开时扫描已有历史，只保留最后一条记录。
#[derive(Debug)]
pub struct FileRecoveryLog {
    path: PathBuf,
    file: File,
    last: Option<String>,
    record_count: usize,
    has_header: bool,
    created: bool,
}

impl FileRecoveryLog {
    /// 打开（或新建）日志文件
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut last = None;
        let mut record_count = 0;
        let mut has_header = false;
        let created = match File::open(&path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    if is_record_line(&line) {
                        last = Some(line);
                        record_count += 1;
                    } else {
                        has_header = true;
                    }
                }
                record_count == 0 && !has_header
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };

        if created {
            info!(path = %path.display(), "No history, opening new log");
        } else {
            info!(path = %path.display(), records = record_count, "Loading history from log");
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            last,
            record_count,
            has_header,
            created,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 打开时文件是否不存在或为空（用于判断首次启动）
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// 文件中的记录条数
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }
}

impl PositionRecoveryLog for FileRecoveryLog {
    fn append(&mut self, line: &str) -> io::Result<()> {
        let entry = timestamped(line);
        self.write_line(&entry)?;
        debug!(path = %self.path.display(), "{}", entry);
        self.last = Some(entry);
        self.record_count += 1;
        Ok(())
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        self.write_line(header)?;
        self.has_header = true;
        Ok(())
    }

    fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// 内存恢复日志（测试与无持久化场景）
#[derive(Debug, Clone, Default)]
pub struct MemoryRecoveryLog {
    header: Option<String>,
    last: Option<String>,
    record_count: usize,
}

impl MemoryRecoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已有记录初始化（记录行原样保存，不再加时间戳）
    pub fn with_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        records.into_iter().fold(Self::default(), |mut log, line| {
            log.last = Some(line.into());
            log.record_count += 1;
            log
        })
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

impl PositionRecoveryLog for MemoryRecoveryLog {
    fn append(&mut self, line: &str) -> io::Result<()> {
        self.last = Some(timestamped(line));
        self.record_count += 1;
        Ok(())
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        self.header = Some(header.to_string());
        Ok(())
    }

    fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl<T: PositionRecoveryLog + ?Sized> PositionRecoveryLog for Box<T> {
    fn append(&mut self, line: &str) -> io::Result<()> {
        (**self).append(line)
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        (**self).write_header(header)
    }

    fn last(&self) -> Option<&str> {
        (**self).last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_prefix() {
        let entry = timestamped("45.00000, 900");
        assert!(is_record_line(&entry));
        assert!(entry.ends_with(", 45.00000, 900"));
        let (stamp, _) = entry.split_once(", ").unwrap();
        assert!(chrono::DateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_header_is_not_a_record() {
        assert!(!is_record_line("date, angle(deg), pos(steps)"));
        assert!(is_record_line("2025-01-20/10:00:00+0000, 45.0"));
    }

    #[test]
    fn test_new_file_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stepper").join("r1.log");
        let mut log = FileRecoveryLog::open(&path).unwrap();
        assert!(log.was_created());
        assert!(log.is_empty());

        log.write_header("date, angle(deg)").unwrap();
        assert!(log.is_empty());
        assert!(log.last().is_none());

        log.append("1.00000, 10").unwrap();
        log.append("2.00000, 20").unwrap();
        assert!(log.last().unwrap().ends_with("2.00000, 20"));
    }

    #[test]
    fn test_reopen_restores_last_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r1.log");
        {
            let mut log = FileRecoveryLog::open(&path).unwrap();
            log.write_header("date, angle(deg)").unwrap();
            log.append("1.00000, 10").unwrap();
            log.append("3.00000, 30").unwrap();
        }

        let log = FileRecoveryLog::open(&path).unwrap();
        assert!(!log.was_created());
        assert!(log.has_header());
        assert_eq!(log.record_count(), 2);
        assert!(log.last().unwrap().ends_with("3.00000, 30"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.starts_with("date, angle(deg)\n"));
    }

    #[test]
    fn test_long_history_keeps_only_last_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r1.log");
        {
            let mut log = FileRecoveryLog::open(&path).unwrap();
            log.write_header("date, angle(deg)").unwrap();
            for i in 0..500 {
                log.append(&format!("{}.00000, {}", i, i * 10)).unwrap();
            }
            assert_eq!(log.record_count(), 500);
            assert!(log.last().unwrap().ends_with("499.00000, 4990"));
        }

        let log = FileRecoveryLog::open(&path).unwrap();
        assert_eq!(log.record_count(), 500);
        assert!(log.last().unwrap().ends_with("499.00000, 4990"));
    }

    #[test]
    fn test_empty_existing_file_counts_as_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").unwrap();
        let log = FileRecoveryLog::open(&path).unwrap();
        assert!(log.was_created());
    }

    #[test]
    fn test_memory_log() {
        let mut log = MemoryRecoveryLog::new();
        assert!(log.is_empty());
        log.write_header("date").unwrap();
        assert!(log.is_empty());
        log.append("a").unwrap();
        assert!(log.last().unwrap().ends_with(", a"));

        let seeded = MemoryRecoveryLog::with_records(["x", "y"]);
        assert_eq!(seeded.last(), Some("y"));
        assert_eq!(seeded.record_count(), 2);
    }

    #[test]
    fn test_boxed_log() {
        let mut log: Box<dyn PositionRecoveryLog> = Box::new(MemoryRecoveryLog::new());
        log.append("a").unwrap();
        assert!(!log.is_empty());
    }
}
