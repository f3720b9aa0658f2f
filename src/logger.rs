/// Set to false to hide date in logs
const LOG_SHOW_DATE: bool = false;
/// Set to false to hide time in logs
const LOG_SHOW_TIME: bool = true;

/// Log format character widths (hardcoded for precise alignment)
const TAG_WIDTH: usize = 9;
const LOG_TYPE_WIDTH: usize = 7;

use chrono::Local;
use colored::*;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log tags for categorizing log messages.
#[derive(Debug, Clone)]
pub enum LogTag {
    Rpc,
    Tokens,
    Collector,
    Scheduler,
    Database,
    Health,
    Webserver,
    Config,
    System,
    Other(String),
}

impl LogTag {
    fn label(&self) -> &str {
        match self {
            LogTag::Rpc => "RPC",
            LogTag::Tokens => "TOKENS",
            LogTag::Collector => "COLLECT",
            LogTag::Scheduler => "SCHED",
            LogTag::Database => "DB",
            LogTag::Health => "HEALTH",
            LogTag::Webserver => "WEB",
            LogTag::Config => "CONFIG",
            LogTag::System => "SYSTEM",
            LogTag::Other(s) => s,
        }
    }
}

/// Minimum level that gets printed: 0=debug, 1=info, 2=warn, 3=error
static MIN_LEVEL: AtomicU8 = AtomicU8::new(1);

/// Install the minimum log level from the `log_level` config option.
/// Unknown values fall back to `info`.
pub fn init(level: &str) {
    let rank = match level.to_lowercase().as_str() {
        "debug" => 0,
        "info" => 1,
        "warn" | "warning" => 2,
        "error" => 3,
        _ => 1,
    };
    MIN_LEVEL.store(rank, Ordering::Relaxed);
}

/// Rank of a log type string; unknown types log at info level.
fn type_rank(log_type: &str) -> u8 {
    match log_type.to_uppercase().as_str() {
        "DEBUG" => 0,
        "WARN" | "WARNING" => 2,
        "ERROR" => 3,
        _ => 1,
    }
}

/// Logs a message with time, tag and log type, colored fixed-width prefix.
pub fn log(tag: LogTag, log_type: &str, message: &str) {
    if type_rank(log_type) < MIN_LEVEL.load(Ordering::Relaxed) {
        return;
    }

    let now = Local::now();
    let mut prefix = String::new();
    if LOG_SHOW_DATE {
        prefix.push_str(&now.format("%Y-%m-%d ").to_string());
    }
    if LOG_SHOW_TIME {
        prefix.push_str(&now.format("%H:%M:%S ").to_string());
    }
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        prefix.dimmed().to_string()
    };

    // Fixed-width log tag
    let tag_str = match &tag {
        LogTag::Rpc => format!("{:<width$}", tag.label(), width = TAG_WIDTH)
            .bright_cyan()
            .bold(),
        LogTag::Tokens | LogTag::Collector => {
            format!("{:<width$}", tag.label(), width = TAG_WIDTH)
                .bright_green()
                .bold()
        }
        LogTag::Scheduler => format!("{:<width$}", tag.label(), width = TAG_WIDTH)
            .bright_magenta()
            .bold(),
        LogTag::Database => format!("{:<width$}", tag.label(), width = TAG_WIDTH)
            .bright_blue()
            .bold(),
        LogTag::Health | LogTag::Webserver => {
            format!("{:<width$}", tag.label(), width = TAG_WIDTH)
                .bright_yellow()
                .bold()
        }
        LogTag::Config | LogTag::System => {
            format!("{:<width$}", tag.label(), width = TAG_WIDTH)
                .white()
                .bold()
        }
        LogTag::Other(_) => format!("{:<width$}", tag.label(), width = TAG_WIDTH)
            .white()
            .bold(),
    };

    // Fixed-width log type
    let log_type_str = match log_type.to_uppercase().as_str() {
        "ERROR" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_red()
            .bold(),
        "WARN" | "WARNING" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_yellow()
            .bold(),
        "SUCCESS" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_green()
            .bold(),
        "INFO" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_blue()
            .bold(),
        "DEBUG" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_black()
            .bold(),
        "BALANCE" => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .bright_yellow()
            .bold(),
        _ => format!("{:<width$}", log_type, width = LOG_TYPE_WIDTH)
            .white()
            .bold(),
    };

    println!(
        "{}[{}] [{}] {}",
        prefix,
        tag_str,
        log_type_str,
        message.bright_white()
    );
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

/// Log at WARN level
pub fn warn(tag: LogTag, message: &str) {
    log(tag, "WARN", message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

/// Log at DEBUG level (only shown when log_level is debug)
pub fn debug(tag: LogTag, message: &str) {
    log(tag, "DEBUG", message);
}
