// src/diaglog.rs

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bit 0 gates write-operation logging, bit 1 gates read-operation
/// logging — the original's two independent `opread`/`opwrite` checks
/// rather than a single on/off switch.
const WRITE_BIT: i32 = 1;
const READ_BIT: i32 = 2;

/// A side channel that records raw request bodies to disk for later
/// replay, opened lazily the first time its level becomes non-zero.
/// Grounded in `instance.cpp`'s `DiagLog` and in the buffered-writer
/// pattern the teacher's AOF writer uses.
pub struct DiagLog {
    dbpath: PathBuf,
    level: AtomicI32,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl DiagLog {
    pub fn new(dbpath: impl Into<PathBuf>) -> Self {
        DiagLog {
            dbpath: dbpath.into(),
            level: AtomicI32::new(0),
            writer: Mutex::new(None),
        }
    }

    pub fn level(&self) -> i32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, new_level: i32) -> std::io::Result<()> {
        if new_level != 0 {
            self.open_file_if_needed()?;
        }
        self.level.store(new_level, Ordering::Relaxed);
        Ok(())
    }

    fn open_file_if_needed(&self) -> std::io::Result<()> {
        let mut guard = self.writer.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path: PathBuf = self.dbpath.join(format!("diaglog.{now:x}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *guard = Some(BufWriter::new(file));
        Ok(())
    }

    pub fn should_log_write(&self) -> bool {
        self.level() & WRITE_BIT != 0
    }

    pub fn should_log_read(&self) -> bool {
        self.level() & READ_BIT != 0
    }

    fn write_bytes(&self, data: &[u8]) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.as_mut() {
                let _ = writer.write_all(data);
            }
        }
    }

    pub fn log_write_op(&self, body: &[u8]) {
        if self.should_log_write() {
            self.write_bytes(body);
        }
    }

    pub fn log_read_op(&self, body: &[u8], forced: bool) {
        if !self.should_log_read() {
            return;
        }
        if forced || Self::occasional_sample() {
            self.write_bytes(body);
        }
    }

    /// One-in-100 sampling for non-forced read logging, matching the
    /// original's `OCCASIONALLY` macro used for the read path.
    fn occasional_sample() -> bool {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed) % 100 == 0
    }

    pub fn flush(&self) {
        if self.level() == 0 {
            return;
        }
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}

/// Logs the first 1000 occurrences of a rare event unconditionally, then
/// only every 100th occurrence after that — the `LOGWITHRATELIMIT` macro
/// from the original, used for "operation not supported" and assertion
/// log lines that could otherwise flood the log under a hostile client.
pub struct RateLimiter {
    count: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            count: AtomicU64::new(0),
        }
    }

    pub fn should_log(&self) -> bool {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        n < 1000 || n % 100 == 0
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
