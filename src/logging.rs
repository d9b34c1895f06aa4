//! protonkit logging system
//!
//! Records go to stderr (filtered by verbosity) and, when enabled, to a
//! per-process log file in the temp directory. The log file captures every
//! level and is shown in the error dialog when running without a terminal.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

// ============================================================================
// System Information Detection
// ============================================================================

#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub app_version: String,
    pub distro: String,
    pub distro_version: String,
    pub kernel: String,
    pub flatpak: bool,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            distro: os_release_value("NAME").unwrap_or_else(|| "Unknown".to_string()),
            distro_version: os_release_value("VERSION_ID").unwrap_or_default(),
            kernel: detect_kernel(),
            flatpak: crate::flatpak::is_flatpak(),
        }
    }

    pub fn to_log_header(&self) -> String {
        format!(
r#"================================================================================
protonkit log - {}
================================================================================
Application:   protonkit v{}
System Info:
  Distro:      {} {}
  Kernel:      {}
  Flatpak:     {}
================================================================================"#,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.app_version,
            self.distro,
            self.distro_version,
            self.kernel,
            if self.flatpak { "yes" } else { "no" },
        )
    }
}

/// Read a `KEY=value` entry from /etc/os-release
pub fn os_release_value(key: &str) -> Option<String> {
    let file = File::open("/etc/os-release").ok()?;
    let prefix = format!("{key}=");
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .find_map(|line| {
            line.strip_prefix(&prefix)
                .map(|value| value.trim_matches('"').to_string())
        })
}

fn detect_kernel() -> String {
    if let Ok(output) = Command::new("uname").arg("-r").output() {
        if output.status.success() {
            return String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
    }
    "Unknown".to_string()
}

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Info => "[INFO]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Error => "[ERROR]",
        }
    }

    /// Lowest level shown on stderr for a `-v` count
    pub fn for_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Warning,
            1 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// Name exported to child processes in `PROTONKIT_LOG_LEVEL`
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

// ============================================================================
// Logger
// ============================================================================

pub struct Logger {
    console_level: LogLevel,
    log_path: Option<PathBuf>,
    log_file: Option<File>,
}

impl Logger {
    fn new(console_level: LogLevel, record_to_file: bool) -> Self {
        let mut logger = Self {
            console_level,
            log_path: None,
            log_file: None,
        };

        if record_to_file {
            let path = log_file_path();
            logger.log_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .ok();
            if logger.log_file.is_some() {
                logger.log_path = Some(path);
                let header = SystemInfo::detect().to_log_header();
                logger.write_file(&header);
            }
        }

        logger
    }

    fn write_file(&mut self, msg: &str) {
        if let Some(ref mut file) = self.log_file {
            let _ = writeln!(file, "{}", msg);
            let _ = file.flush();
        }
    }

    pub fn log(&mut self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        let formatted = format!("[{}] {} {}", timestamp, level.prefix(), message);
        self.write_file(&formatted);

        if level >= self.console_level {
            eprintln!("protonkit ({}): {}", level.name(), message);
        }
    }
}

/// `$TMPDIR/protonkit<pid>.log`
pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join(format!("protonkit{}.log", std::process::id()))
}

// ============================================================================
// Global Logger Access
// ============================================================================

/// Initialize the global logger (call once at startup)
pub fn init_logger(verbose: u8, record_to_file: bool) {
    LOGGER.get_or_init(|| {
        Mutex::new(Logger::new(
            LogLevel::for_verbosity(verbose),
            record_to_file,
        ))
    });
}

/// Get the global logger instance; warnings only, no file, if never initialized
fn logger() -> &'static Mutex<Logger> {
    LOGGER.get_or_init(|| Mutex::new(Logger::new(LogLevel::Warning, false)))
}

/// Console level the logger was initialized with
pub fn console_level() -> LogLevel {
    logger().lock().console_level
}

/// Contents of the log file, if one is being recorded
pub fn read_log_file() -> Option<String> {
    let path = logger().lock().log_path.clone()?;
    fs::read_to_string(path).ok()
}

/// Remove the log file; called on a clean exit
pub fn delete_log_file() {
    let path = {
        let mut log = logger().lock();
        log.log_file = None;
        log.log_path.take()
    };
    if let Some(path) = path {
        let _ = fs::remove_file(path);
    }
}

// ============================================================================
// Convenience Logging Functions
// ============================================================================

pub fn log_debug(message: &str) {
    logger().lock().log(LogLevel::Debug, message);
}

pub fn log_info(message: &str) {
    logger().lock().log(LogLevel::Info, message);
}

pub fn log_warning(message: &str) {
    logger().lock().log(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    logger().lock().log(LogLevel::Error, message);
}
