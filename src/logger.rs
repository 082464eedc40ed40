//! Logging with timestamps, severity and a selectable sink.
//!
//! This module provides:
//! - `log!`, `warn!`, `error!` macros for formatted log lines with a module prefix
//! - `debug!` for lines only shown with `--verbose`
//! - a process-wide [`Sink`]: console (stderr, colored) or an append-only file
//!
//! # Example
//!
//! ```ignore
//! log!("sync"; "pulled {} commits", count);
//! warn!("process"; "pid {} did not exit within {}s", pid, secs);
//! ```

use chrono::Local;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Write, stderr},
    path::Path,
    sync::LazyLock,
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Where log lines go. Selected once at startup.
static SINK: LazyLock<Mutex<Sink>> = LazyLock::new(|| Mutex::new(Sink::Console));

// ============================================================================
// Log Macros
// ============================================================================

/// Log an info message with a module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($crate::logger::Level::Info, $module, &format!($($arg)*))
    }};
}

/// Log a warning with a module prefix
#[macro_export]
macro_rules! warn {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($crate::logger::Level::Warn, $module, &format!($($arg)*))
    }};
}

/// Log an error with a module prefix
#[macro_export]
macro_rules! error {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($crate::logger::Level::Error, $module, &format!($($arg)*))
    }};
}

/// Log a debug message (only written when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($crate::logger::Level::Debug, $module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Level & Sink
// ============================================================================

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log destination.
pub enum Sink {
    /// Colored lines on stderr (`-c/--console`).
    Console,
    /// Plain lines appended to a file.
    File(File),
}

/// Route all further log lines to the console.
pub fn init_console() {
    *SINK.lock() = Sink::Console;
}

/// Route all further log lines to `path`, appending.
///
/// Parent directories are created. On failure the console sink stays active
/// and the error is returned so the caller can report it.
pub fn init_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    *SINK.lock() = Sink::File(file);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Write one log line to the active sink.
pub fn log(level: Level, module: &str, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    let mut sink = SINK.lock();
    match &mut *sink {
        Sink::Console => {
            let line = format_line(&timestamp, level, module, message, true);
            let mut err = stderr().lock();
            writeln!(err, "{line}").ok();
            err.flush().ok();
        }
        Sink::File(file) => {
            let line = format_line(&timestamp, level, module, message, false);
            writeln!(file, "{line}").ok();
            file.flush().ok();
        }
    }
}

/// Format a log line: `<timestamp> <LEVEL> [module] message`.
fn format_line(timestamp: &str, level: Level, module: &str, message: &str, color: bool) -> String {
    if !color {
        return format!("{timestamp} {:<5} [{module}] {message}", level.as_str());
    }

    let level_str = format!("{:<5}", level.as_str());
    let level_str = match level {
        Level::Debug => level_str.dimmed().to_string(),
        Level::Info => level_str.bright_green().to_string(),
        Level::Warn => level_str.bright_yellow().bold().to_string(),
        Level::Error => level_str.bright_red().bold().to_string(),
    };
    let prefix = colorize_prefix(module);
    format!("{} {level_str} {prefix} {message}", timestamp.dimmed())
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "sync" => prefix.bright_blue().bold().to_string(),
        "deploy" => prefix.bright_cyan().bold().to_string(),
        "process" => prefix.bright_magenta().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
