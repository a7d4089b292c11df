//! Structured logging for the network IP prober
//!
//! Entries carry a session id shared by every logger of one run and, for
//! timed pipeline phases, a correlation id. Loggers are created by the
//! entry point through [`LoggerFactory`] and passed down as `Arc`s; nothing
//! here is global.

use crate::error::{AppError, Result};
use crate::models::{Config, PingResult, SpeedResult};
use chrono::{DateTime, Utc};
use colored::{Color, Colorize};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn color(&self) -> Color {
        match self {
            LogLevel::Debug => Color::Cyan,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Component that wrote the entry (APP, PROBE, PERF)
    pub logger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
    /// `file:line` of the macro call site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    /// One JSON object per line
    Json,
    Compact,
}

/// Leveled structured logger; info and below go to stdout, warnings up to stderr
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    session_id: Option<String>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: false,
            include_location: false,
            format: LogFormat::Console,
            name: name.into(),
            session_id: None,
        }
    }

    /// Debug runs log everything as JSON with call sites, verbose runs
    /// log from info, and quiet runs only show warnings and errors
    pub fn with_config(name: impl Into<String>, config: &Config) -> Self {
        let (min_level, format) = if config.debug {
            (LogLevel::Debug, LogFormat::Json)
        } else if config.verbose {
            (LogLevel::Info, LogFormat::Console)
        } else {
            (LogLevel::Warn, LogFormat::Console)
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format,
            name: name.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder {
            logger: self,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message: message.to_string(),
                logger: self.name.clone(),
                session_id: self.session_id.clone(),
                correlation_id: None,
                fields: BTreeMap::new(),
                location: None,
            },
        }
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    /// The line this logger would print for `entry`, if any
    pub fn render(&self, entry: &LogEntry) -> Option<String> {
        if !self.would_log(entry.level) {
            return None;
        }
        Some(match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => serde_json::to_string(entry)
                .unwrap_or_else(|e| format!("{{\"logger\":{:?},\"serialize_error\":{:?}}}", entry.logger, e.to_string())),
            LogFormat::Compact => format!(
                "{} {} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                &entry.level.as_str()[..1],
                entry.logger,
                entry.message
            ),
        })
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let level = format!("{:>5}", entry.level.as_str());
        let level = if self.use_color {
            level.color(entry.level.color()).to_string()
        } else {
            level
        };

        let mut output = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            level,
            entry.logger,
            entry.message
        );
        if let Some(id) = &entry.correlation_id {
            output.push_str(&format!(" [{}]", &id[..id.len().min(8)]));
        }
        if !entry.fields.is_empty() {
            let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }
        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}", location));
            }
        }
        output
    }

    fn write_entry(&self, entry: &LogEntry) {
        let Some(line) = self.render(entry) else {
            return;
        };
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", line);
        } else {
            let _ = writeln!(io::stdout(), "{}", line);
        }
    }
}

/// Builder for a single log entry
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32) -> Self {
        self.entry.location = Some(format!("{}:{}", file, line));
        self
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
    }

    pub fn build(self) -> LogEntry {
        self.entry
    }

    pub async fn log(self) {
        self.logger.write_entry(&self.entry);
    }
}

/// DNS attempts, circuit blocks, fallbacks and probe outcomes
pub struct ProbeLogger {
    logger: Logger,
}

impl ProbeLogger {
    pub fn new(config: &Config) -> Self {
        Self::from_logger(Logger::with_config("PROBE", config))
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn log_dns_attempt(&self, domain: &str, server: &str, success: bool, elapsed_ms: f64, error: Option<&str>) {
        let message = match error {
            None if success => format!("{} via {}: {:.1}ms", domain, server, elapsed_ms),
            _ => format!("{} via {} failed: {}", domain, server, error.unwrap_or("no answer")),
        };
        self.logger
            .debug(&message)
            .field("domain", domain)
            .field("server", server)
            .field("success", success)
            .field("elapsed_ms", elapsed_ms)
            .log()
            .await;
    }

    /// A server skipped without I/O
    pub async fn log_circuit_block(&self, server: &str, reason: &str) {
        self.logger
            .info(&format!("Skipping DNS server {}: {}", server, reason))
            .field("server", server)
            .log()
            .await;
    }

    pub async fn log_system_fallback(&self, domain: &str, found: usize) {
        self.logger
            .warn(&format!("Every DNS server failed for {}; host resolver found {} address(es)", domain, found))
            .field("domain", domain)
            .field("addresses", found)
            .log()
            .await;
    }

    pub async fn log_poisoning(&self, domain: &str, suspect: Option<&str>, message: &str) {
        self.logger
            .warn(&format!("{}: {}", domain, message))
            .field("domain", domain)
            .field("suspect_server", suspect)
            .log()
            .await;
    }

    pub async fn log_ping(&self, result: &PingResult) {
        let (level, message) = if result.success {
            (
                LogLevel::Debug,
                format!("ping {}: {:.1}ms avg, {:.0}% loss", result.ip, result.avg_delay, result.packet_loss),
            )
        } else {
            (
                LogLevel::Info,
                format!("ping {} failed: {}", result.ip, result.error.as_deref().unwrap_or("no replies")),
            )
        };
        self.logger
            .log(level, &message)
            .field("ip", result.ip)
            .field("method", result.method.as_str())
            .field("received", format!("{}/{}", result.received, result.sent))
            .log()
            .await;
    }

    pub async fn log_speed(&self, result: &SpeedResult) {
        let level = if result.success { LogLevel::Debug } else { LogLevel::Info };
        let estimate = if result.estimated { " (estimated)" } else { "" };
        self.logger
            .log(level, &format!("{} {}: {:.2} Mbps{}", result.test_type.as_str(), result.ip, result.speed_mbps, estimate))
            .field("ip", result.ip)
            .field("bytes", result.bytes_transferred)
            .field("duration_secs", result.duration_secs)
            .log()
            .await;
    }

    /// A worker task that never reported back
    pub async fn log_task_failure(&self, target: &str, error: &AppError) {
        self.logger
            .warn(&format!("{}: {}", target, error))
            .field("target", target)
            .error_info(error)
            .log()
            .await;
    }
}

/// Timing for pipeline phases; each phase gets its own correlation id
pub struct PerformanceLogger {
    logger: Logger,
    phases: Mutex<HashMap<String, (Instant, String)>>,
}

impl PerformanceLogger {
    pub fn new(config: &Config) -> Self {
        Self::from_logger(Logger::with_config("PERF", config))
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self {
            logger,
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// Begin timing `operation` and return its correlation id
    pub async fn start_timing(&self, operation: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.phases.lock().insert(operation.to_string(), (Instant::now(), id.clone()));
        self.logger
            .debug(&format!("{} started", operation))
            .correlation_id(&id)
            .log()
            .await;
        id
    }

    /// Stop timing; `None` for an operation that was never started
    pub async fn end_timing(&self, operation: &str) -> Option<Duration> {
        let Some((started, id)) = self.phases.lock().remove(operation) else {
            self.logger
                .debug(&format!("{} was not being timed", operation))
                .log()
                .await;
            return None;
        };
        let elapsed = started.elapsed();
        self.logger
            .info(&format!("{} took {}ms", operation, elapsed.as_millis()))
            .correlation_id(&id)
            .field("duration_ms", elapsed.as_secs_f64() * 1000.0)
            .log()
            .await;
        Some(elapsed)
    }

    pub fn active_operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.phases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn log_batch_summary(&self, stage: &str, batch_size: usize, succeeded: usize, total: Duration) {
        let per_item = if batch_size == 0 { 0.0 } else { total.as_secs_f64() / batch_size as f64 };
        self.logger
            .info(&format!("{}: {}/{} succeeded in {:.3}s", stage, succeeded, batch_size, total.as_secs_f64()))
            .field("stage", stage)
            .field("batch_size", batch_size)
            .field("succeeded", succeeded)
            .field("avg_per_item_seconds", per_item)
            .log()
            .await;
    }
}

/// Creates loggers that share one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn create_logger(&self, name: &str) -> Logger {
        Logger::with_config(name, &self.config).with_session(self.session_id.clone())
    }

    pub async fn create_probe_logger(&self) -> Arc<ProbeLogger> {
        Arc::new(ProbeLogger::from_logger(self.create_logger("PROBE").await))
    }

    pub fn create_performance_logger(&self) -> PerformanceLogger {
        PerformanceLogger::from_logger(Logger::with_config("PERF", &self.config).with_session(self.session_id.clone()))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*)).location(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*)).location(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*)).location(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*)).location(file!(), line!()).log().await
    };
}
