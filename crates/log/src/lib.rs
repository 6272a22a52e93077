//! Process-wide leveled logging for the qitd crates.
//!
//! Records are written to stderr as text or JSON lines and can additionally be
//! kept in a bounded in-memory ring so tests and status commands can read
//! them back.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let level = match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text = 0,
    Json = 1,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn from_u8(raw: u8) -> Self {
        if raw == Self::Json as u8 {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Text,
            timestamps: true,
        }
    }
}

/// A single emitted log line.
#[derive(Clone, Debug)]
pub struct Record {
    pub ts_ms: u64,
    pub level: Level,
    pub target: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub msg: String,
}

impl Record {
    pub fn render_text(&self, timestamps: bool) -> String {
        if timestamps {
            format!(
                "{} {} {}: {}",
                UtcTime::from_millis(self.ts_ms),
                self.level,
                self.target,
                self.msg
            )
        } else {
            format!("{} {}: {}", self.level, self.target, self.msg)
        }
    }

    pub fn render_json(&self) -> String {
        json!({
            "ts_ms": self.ts_ms,
            "level": self.level.as_str(),
            "target": self.target,
            "file": self.file,
            "line": self.line,
            "msg": self.msg,
        })
        .to_string()
    }
}

struct Capture {
    capacity: usize,
    records: VecDeque<Record>,
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static FORMAT: AtomicU8 = AtomicU8::new(Format::Text as u8);
static TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static STDERR: AtomicBool = AtomicBool::new(true);
static CAPTURING: AtomicBool = AtomicBool::new(false);
static CAPTURE: Mutex<Option<Capture>> = Mutex::new(None);

pub fn init(config: LogConfig) {
    MAX_LEVEL.store(config.level as u8, Ordering::Relaxed);
    FORMAT.store(config.format as u8, Ordering::Relaxed);
    TIMESTAMPS.store(config.timestamps, Ordering::Relaxed);
}

pub fn set_stderr_enabled(enabled: bool) {
    STDERR.store(enabled, Ordering::Relaxed);
}

/// Keep the most recent `capacity` records in memory. Zero turns capture off.
pub fn enable_capture(capacity: usize) {
    let Ok(mut guard) = CAPTURE.lock() else {
        return;
    };
    if capacity == 0 {
        *guard = None;
        CAPTURING.store(false, Ordering::Relaxed);
        return;
    }
    match guard.as_mut() {
        Some(capture) => {
            capture.capacity = capacity;
            while capture.records.len() > capacity {
                capture.records.pop_front();
            }
        }
        None => {
            *guard = Some(Capture {
                capacity,
                records: VecDeque::with_capacity(capacity.min(1024)),
            });
        }
    }
    CAPTURING.store(true, Ordering::Relaxed);
}

pub fn clear_captured() {
    if let Ok(mut guard) = CAPTURE.lock() {
        if let Some(capture) = guard.as_mut() {
            capture.records.clear();
        }
    }
}

/// Up to `limit` of the most recent captured records, oldest first.
pub fn capture_snapshot(limit: usize) -> Vec<Record> {
    let Ok(guard) = CAPTURE.lock() else {
        return Vec::new();
    };
    let Some(capture) = guard.as_ref() else {
        return Vec::new();
    };
    let skip = capture.records.len().saturating_sub(limit);
    capture.records.iter().skip(skip).cloned().collect()
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

pub fn log(
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
) {
    if !enabled(level) {
        return;
    }
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or_default();
    let record = Record {
        ts_ms,
        level,
        target,
        file,
        line,
        msg: args.to_string(),
    };

    if STDERR.load(Ordering::Relaxed) {
        let rendered = match Format::from_u8(FORMAT.load(Ordering::Relaxed)) {
            Format::Text => record.render_text(TIMESTAMPS.load(Ordering::Relaxed)),
            Format::Json => record.render_json(),
        };
        let _ = writeln!(io::stderr().lock(), "{rendered}");
    }

    if CAPTURING.load(Ordering::Relaxed) {
        if let Ok(mut guard) = CAPTURE.lock() {
            if let Some(capture) = guard.as_mut() {
                if capture.records.len() == capture.capacity {
                    capture.records.pop_front();
                }
                capture.records.push_back(record);
            }
        }
    }
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Error, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Warn, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Info, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Debug, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Trace, $($arg)*);
    }};
}

/// RFC 3339 UTC rendering of a unix millisecond timestamp.
struct UtcTime {
    year: i64,
    month: u32,
    day: u32,
    seconds_of_day: u32,
    millis: u32,
}

impl UtcTime {
    fn from_millis(ts_ms: u64) -> Self {
        let secs = ts_ms / 1000;
        let days = (secs / 86_400) as i64;
        let (year, month, day) = date_from_unix_days(days);
        Self {
            year,
            month,
            day,
            seconds_of_day: (secs % 86_400) as u32,
            millis: (ts_ms % 1000) as u32,
        }
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour = self.seconds_of_day / 3600;
        let minute = self.seconds_of_day / 60 % 60;
        let second = self.seconds_of_day % 60;
        write!(
            f,
            "{:04}-{:02}-{:02}T{hour:02}:{minute:02}:{second:02}.{:03}Z",
            self.year, self.month, self.day, self.millis
        )
    }
}

/// Proleptic Gregorian date for a day count relative to 1970-01-01.
fn date_from_unix_days(days: i64) -> (i64, u32, u32) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of a year.
    let shifted = days + 719_468;
    let era = shifted.div_euclid(146_097);
    let day_of_era = shifted.rem_euclid(146_097);
    let year_of_era = (day_of_era - day_of_era / 1_460 + day_of_era / 36_524
        - day_of_era / 146_096)
        / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * month_index + 2) / 5 + 1) as u32;
    let month = if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    } as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
