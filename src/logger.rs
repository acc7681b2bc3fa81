use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Http = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
            LogLevel::Http => Color::Magenta,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
            LogLevel::Http => "🌐",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Http => "HTTP",
        }
    }

    /// HTTP traffic records are informational as far as `log` is concerned.
    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Debug => Level::Debug,
            LogLevel::Info | LogLevel::Http => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info | LogLevel::Http => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace | Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }

    fn alerts(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Http)
    }
}

/// One structured record: a tag naming the step, a message and JSON fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
    pub fields: Value,
    pub duration_ms: Option<u64>,
}

impl LogEntry {
    pub fn new(level: LogLevel, tag: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            tag: tag.to_string(),
            message: message.to_string(),
            fields: Value::Null,
            duration_ms: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Whether error and HTTP records also raise a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPolicy {
    FileOnly,
    AlertOnError,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub echo_console: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<PathBuf>,
    pub raw_dump_dir: Option<PathBuf>,
    pub alert_policy: AlertPolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            echo_console: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
            raw_dump_dir: None,
            alert_policy: AlertPolicy::FileOnly,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.echo_console = enabled;
        self
    }

    pub fn with_file_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }

    pub fn with_raw_dumps(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dump_dir = Some(dir.into());
        self
    }

    pub fn with_alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alert_policy = policy;
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            output_json: false,
            ..Default::default()
        }
    }

    /// No console, no file. Used by library callers that do not care.
    pub fn quiet() -> Self {
        Self {
            echo_console: false,
            ..Default::default()
        }
    }
}

/// Blocking user notification, the CLI counterpart of a host alert box.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        eprintln!("{}", format!("┌─ {}", title).red().bold());
        for line in message.lines() {
            eprintln!("{} {}", "│".red(), line);
        }
        eprintln!("{}", "└─".red());
    }
}

#[derive(Debug, Default, Clone)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}

struct LoggerInner {
    config: LoggerConfig,
    log_file: Mutex<Option<File>>,
    notifier: Arc<dyn Notifier>,
    entries: AtomicUsize,
    start_time: Instant,
}

/// Logging context handed to every component that reports progress.
/// Cloning is cheap and all clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.inner.config)
            .field("entries", &self.entry_count())
            .finish()
    }
}

impl Logger {
    pub fn new(config: LoggerConfig) -> io::Result<Self> {
        Self::with_notifier(config, Arc::new(SilentNotifier))
    }

    pub fn with_notifier(config: LoggerConfig, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        let log_file = match &config.log_file_path {
            Some(path) => Some(open_log_file(path)?),
            None => None,
        };
        Ok(Self {
            inner: Arc::new(LoggerInner {
                config,
                log_file: Mutex::new(log_file),
                notifier,
                entries: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        })
    }

    pub fn quiet() -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                config: LoggerConfig::quiet(),
                log_file: Mutex::new(None),
                notifier: Arc::new(SilentNotifier),
                entries: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.load(Ordering::Relaxed)
    }

    /// Routes this logger behind the `log` facade so records from dependencies
    /// land in the same sinks.
    pub fn install(&self) -> Result<(), String> {
        log::set_boxed_logger(Box::new(self.clone()))
            .map_err(|e| format!("Failed to set logger: {:?}", e))?;
        log::set_max_level(self.inner.config.min_level.to_log_level_filter());
        Ok(())
    }

    pub fn debug(&self, tag: &str, message: &str, fields: Value) {
        self.log(LogEntry::new(LogLevel::Debug, tag, message).with_fields(fields));
    }

    pub fn info(&self, tag: &str, message: &str, fields: Value) {
        self.log(LogEntry::new(LogLevel::Info, tag, message).with_fields(fields));
    }

    pub fn warn(&self, tag: &str, message: &str, fields: Value) {
        self.log(LogEntry::new(LogLevel::Warn, tag, message).with_fields(fields));
    }

    pub fn error(&self, tag: &str, message: &str, fields: Value) {
        self.log(LogEntry::new(LogLevel::Error, tag, message).with_fields(fields));
    }

    pub fn http(&self, tag: &str, message: &str, fields: Value) {
        self.log(LogEntry::new(LogLevel::Http, tag, message).with_fields(fields));
    }

    pub fn log(&self, entry: LogEntry) {
        let config = &self.inner.config;
        if entry.level < config.min_level {
            return;
        }
        self.inner.entries.fetch_add(1, Ordering::Relaxed);

        if config.echo_console {
            if config.output_json {
                println!("{}", serde_json::to_string(&entry).unwrap_or_default());
            } else {
                println!("{}", self.format_console_output(&entry));
            }
        }

        self.write_line(&format_file_line(&entry, config));

        if config.alert_policy == AlertPolicy::AlertOnError && entry.level.alerts() {
            let title = format!("{} [{}]", entry.level.as_str(), entry.tag);
            let mut body = entry.message.clone();
            if !entry.fields.is_null() {
                body.push_str("\nData: ");
                body.push_str(&entry.fields.to_string());
            }
            self.inner.notifier.notify(&title, &body);
        }
    }

    /// Writes the untouched response body into the debug log and, when a dump
    /// directory is configured, into its own file. Returns the dump path.
    pub fn log_raw_response(&self, body: &str) -> Option<PathBuf> {
        self.write_line("=== RAW HTTP RESPONSE START ===");
        self.write_line(&format!("Response Length: {} bytes", body.len()));
        self.write_line(body);
        self.write_line("=== RAW HTTP RESPONSE END ===");

        let dir = self.inner.config.raw_dump_dir.as_ref()?;
        let path = dir.join(format!(
            "FAL_Raw_Response_{}_{}.txt",
            Utc::now().format("%Y%m%d_%H%M%S%3f"),
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        match std::fs::write(&path, body) {
            Ok(()) => Some(path),
            Err(e) => {
                self.warn(
                    "RAW_RESPONSE",
                    "Could not save raw response dump",
                    serde_json::json!({ "path": path.display().to_string(), "error": e.to_string() }),
                );
                None
            }
        }
    }

    pub fn close(&self) {
        self.write_line("=========================================");
        self.write_line(&format!("Log ended: {}", Utc::now().to_rfc2822()));
        self.write_line(&format!("Total entries: {}", self.entry_count()));
        self.write_line(&format!(
            "Elapsed: {}ms",
            self.inner.start_time.elapsed().as_millis()
        ));
        if let Ok(mut guard) = self.inner.log_file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }

    pub fn timer(&self, tag: &str) -> Timer {
        Timer::new(self.clone(), tag)
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut guard) = self.inner.log_file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    fn format_console_output(&self, entry: &LogEntry) -> String {
        let config = &self.inner.config;
        let mut output = String::new();

        if config.include_timestamp {
            let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
            if config.show_colors {
                output.push_str(&format!("{} ", timestamp.bright_black()));
            } else {
                output.push_str(&format!("{} ", timestamp));
            }
        }

        let level_str = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        if config.show_colors {
            output.push_str(&format!(
                "[{}] {} ",
                level_str.color(entry.level.color()).bold(),
                entry.tag.bright_blue()
            ));
            output.push_str(&entry.message.white().bold().to_string());
        } else {
            output.push_str(&format!("[{}] {} {}", level_str, entry.tag, entry.message));
        }

        if !entry.fields.is_null() {
            let fields = entry.fields.to_string();
            if config.show_colors {
                output.push_str(&format!(" {}", fields.bright_cyan()));
            } else {
                output.push_str(&format!(" {}", fields));
            }
        }

        if let Some(duration) = entry.duration_ms {
            if config.show_colors {
                output.push_str(&format!(" [{}ms]", duration.to_string().bright_magenta()));
            } else {
                output.push_str(&format!(" [{}ms]", duration));
            }
        }

        output
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "=== falgen debug log ===")?;
    writeln!(file, "Started: {}", Utc::now().to_rfc2822())?;
    writeln!(file, "Log file: {}", path.display())?;
    writeln!(file, "=========================================")?;
    Ok(file)
}

fn format_file_line(entry: &LogEntry, config: &LoggerConfig) -> String {
    if config.output_json {
        return serde_json::to_string(entry).unwrap_or_default();
    }
    let mut line = format!(
        "{} | [{} {}] {}",
        entry.timestamp.format(&config.timestamp_format),
        entry.level.as_str(),
        entry.tag,
        entry.message
    );
    if let Some(duration) = entry.duration_ms {
        line.push_str(&format!(" ({}ms)", duration));
    }
    if !entry.fields.is_null() {
        line.push_str("\nData: ");
        line.push_str(&entry.fields.to_string());
    }
    line
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.inner.config.min_level.to_log_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let entry = LogEntry::new(
                LogLevel::from_log_level(record.level()),
                record.target(),
                &record.args().to_string(),
            );
            Logger::log(self, entry);
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        if let Ok(mut guard) = self.inner.log_file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long a step took when it goes out of scope.
pub struct Timer {
    logger: Logger,
    start: Instant,
    tag: String,
}

impl Timer {
    fn new(logger: Logger, tag: &str) -> Self {
        Self {
            logger,
            start: Instant::now(),
            tag: tag.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let entry = LogEntry::new(LogLevel::Debug, &self.tag, "step finished")
            .with_duration(self.elapsed());
        self.logger.log(entry);
    }
}
