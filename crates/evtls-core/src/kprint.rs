//! Kernel-style stderr logging
//!
//! Lines go straight to a locked stderr, so output from different event
//! loops never interleaves within a line. Each leveled line carries the
//! module that emitted it, and optionally the emitting thread's name,
//! which is the quickest way to see which loop ran a broadcast.
//!
//! # Environment Variables
//!
//! - `EVTLS_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `EVTLS_FLUSH_EPRINT=1` - Flush stderr after each line
//! - `EVTLS_LOG_THREAD=1` - Tag each leveled line with the thread name
//!
//! The environment is read once, on first use. The setters below override it.
//!
//! # Usage
//!
//! ```ignore
//! use evtls_core::{kinfo, kdebug};
//!
//! kinfo!("worker {} started", name);
//! kdebug!("slot {} freed", index);
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

/// Log levels, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Values past `Trace` saturate
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or number; unknown input yields `None`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return (n <= 5).then(|| Self::from_u8(n));
        }
        [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
        .into_iter()
        .find(|level| level.label().eq_ignore_ascii_case(s))
    }

    /// Upper-case name as printed in log lines
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct Settings {
    level: AtomicU8,
    flush: AtomicBool,
    thread_tag: AtomicBool,
}

impl Settings {
    fn from_env() -> Self {
        let level = std::env::var("EVTLS_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Warn);
        Self {
            level: AtomicU8::new(level as u8),
            flush: AtomicBool::new(env_flag("EVTLS_FLUSH_EPRINT")),
            thread_tag: AtomicBool::new(env_flag("EVTLS_LOG_THREAD")),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[inline]
fn settings() -> &'static Settings {
    SETTINGS.get_or_init(Settings::from_env)
}

/// Read the environment now rather than on the first log line
pub fn init() {
    settings();
}

#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(settings().level.load(Ordering::Relaxed))
}

pub fn set_log_level(level: LogLevel) {
    settings().level.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn flush_enabled() -> bool {
    settings().flush.load(Ordering::Relaxed)
}

pub fn set_flush_enabled(enabled: bool) {
    settings().flush.store(enabled, Ordering::Relaxed);
}

/// Tag leveled lines with the current thread name
pub fn set_thread_tag_enabled(enabled: bool) {
    settings().thread_tag.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

/// Format one leveled line: `LEVEL target [thread] message`
fn write_line<W: Write>(
    out: &mut W,
    level: LogLevel,
    target: &str,
    thread: Option<&str>,
    args: fmt::Arguments<'_>,
) -> io::Result<()> {
    write!(out, "{:<5} {}", level.label(), target)?;
    if let Some(name) = thread {
        write!(out, " [{}]", name)?;
    }
    write!(out, " {}", args)?;
    out.write_all(b"\n")
}

fn finish(handle: &mut io::StderrLock<'_>) {
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _kprint_impl(args: fmt::Arguments<'_>, newline: bool) {
    let mut handle = io::stderr().lock();
    let _ = handle.write_fmt(args);
    if newline {
        let _ = handle.write_all(b"\n");
    }
    finish(&mut handle);
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, target: &str, args: fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let current = std::thread::current();
    let thread = settings()
        .thread_tag
        .load(Ordering::Relaxed)
        .then(|| current.name().unwrap_or("unnamed"));

    let mut handle = io::stderr().lock();
    let _ = write_line(&mut handle, level, target, thread, args);
    finish(&mut handle);
}

/// Print to stderr (no newline, no level)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::kprint::_kprint_impl(format_args!($($arg)*), false)
    };
}

/// Print a line to stderr (no level)
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_kprint_impl(format_args!(""), true)
    };
    ($($arg:tt)*) => {
        $crate::kprint::_kprint_impl(format_args!($($arg)*), true)
    };
}

/// Leveled line tagged with the calling module
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::kprint::_klog_impl($level, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Debug, $($arg)*) };
}

/// Per-callback fan-out
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(level: LogLevel, thread: Option<&str>, args: fmt::Arguments<'_>) -> String {
        let mut out = Vec::new();
        write_line(&mut out, level, "evtls_core::slot", thread, args).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Warn < LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" TRACE "), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("2"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("9"), None);
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            line(LogLevel::Warn, None, format_args!("slot {} freed", 3)),
            "WARN  evtls_core::slot slot 3 freed\n"
        );
        assert_eq!(
            line(LogLevel::Error, Some("evtls-worker-0"), format_args!("boom")),
            "ERROR evtls_core::slot [evtls-worker-0] boom\n"
        );
    }

    #[test]
    fn test_off_disables_everything() {
        set_log_level(LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));
        assert!(!level_enabled(LogLevel::Off));

        kprint!("");
        kprintln!();
        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug");
        ktrace!("trace");
    }
}
