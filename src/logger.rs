use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ServerConfig;

static SERVICE_LOGGER: Lazy<ServiceLogger> = Lazy::new(ServiceLogger::new);
static INSTALLED: OnceCell<()> = OnceCell::new();

pub fn init() -> Result<(), String> {
    init_with_config(LoggerConfig::from_env())
}

/// Installs the service logger. Calling it again only swaps the configuration.
pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    let max_level = config.min_level.to_level_filter();
    SERVICE_LOGGER.update_config(config)?;

    INSTALLED.get_or_try_init(|| {
        log::set_logger(&*SERVICE_LOGGER).map_err(|e| format!("Failed to set logger: {:?}", e))
    })?;

    log::set_max_level(max_level);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }

    fn allows(&self, level: Level) -> bool {
        level <= self.to_level_filter()
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub thread_id: String,
}

impl LogEntry {
    fn from_record(record: &Record) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level: record.level().into(),
            message: record.args().to_string(),
            module: record.module_path().unwrap_or("unknown").to_string(),
            file: record.file().unwrap_or("unknown").to_string(),
            line: record.line().unwrap_or(0),
            thread_id: format!("{:?}", std::thread::current().id()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_thread_id: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_thread_id: false,
            show_file_location: false,
            show_module: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LOG_FORMAT=json` selects the production layout, `LOG_LEVEL` sets the
    /// threshold and `LOG_FILE` mirrors every line to a file.
    pub fn from_env() -> Self {
        let mut config = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => Self::production(),
            _ => Self::development(),
        };
        if let Some(level) = env::var("LOG_LEVEL").ok().as_deref().and_then(LogLevel::parse) {
            config.min_level = level;
        }
        if let Ok(path) = env::var("LOG_FILE") {
            config.log_file_path = Some(path);
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_file_location: true,
            ..Default::default()
        }
    }
}

struct LoggerState {
    config: LoggerConfig,
    file: Option<File>,
}

pub struct ServiceLogger {
    state: Mutex<LoggerState>,
}

impl ServiceLogger {
    fn new() -> Self {
        Self {
            state: Mutex::new(LoggerState {
                config: LoggerConfig::default(),
                file: None,
            }),
        }
    }

    fn update_config(&self, config: LoggerConfig) -> Result<(), String> {
        let file = match &config.log_file_path {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| format!("Failed to open log file {}: {}", path, e))?,
            ),
            None => None,
        };

        let mut state = self
            .state
            .lock()
            .map_err(|_| "Logger state poisoned".to_string())?;
        state.config = config;
        state.file = file;
        Ok(())
    }

    fn format_line(entry: &LogEntry, config: &LoggerConfig) -> String {
        if config.output_json {
            return serde_json::to_string(entry).unwrap_or_default();
        }

        let mut output = String::new();
        let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
        let level = format!("[{:<5}]", entry.level.as_str());

        if config.show_colors {
            output.push_str(&format!(
                "{} {} ",
                timestamp.bright_black(),
                level.color(entry.level.color()).bold()
            ));
        } else {
            output.push_str(&format!("{} {} ", timestamp, level));
        }

        if config.show_module && !entry.module.is_empty() {
            if config.show_colors {
                output.push_str(&format!("{}: ", entry.module.bright_blue()));
            } else {
                output.push_str(&format!("{}: ", entry.module));
            }
        }

        output.push_str(&entry.message);

        if config.show_thread_id {
            output.push_str(&format!(" [thread:{}]", entry.thread_id));
        }

        if config.show_file_location {
            let location = format!("({}:{})", entry.file, entry.line);
            if config.show_colors {
                output.push_str(&format!(" {}", location.bright_black()));
            } else {
                output.push_str(&format!(" {}", location));
            }
        }

        output
    }
}

impl log::Log for ServiceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.state.lock() {
            Ok(state) => state.config.min_level.allows(metadata.level()),
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.config.min_level.allows(record.level()) {
            return;
        }

        let entry = LogEntry::from_record(record);
        println!("{}", Self::format_line(&entry, &state.config));

        if state.file.is_some() {
            let plain = LoggerConfig {
                show_colors: false,
                ..state.config.clone()
            };
            let line = Self::format_line(&entry, &plain);
            if let Some(file) = state.file.as_mut() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        if let Ok(mut state) = self.state.lock() {
            if let Some(file) = state.file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long a pipeline stage took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("Starting {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!("{} finished in {}ms", self.name, self.elapsed().as_millis());
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_startup_info(app_name: &str, version: &str, config: &ServerConfig) {
    log::info!("Starting {} v{}", app_name, version);
    log::info!("Listening on http://{}:{}", config.host, config.port);
    log::info!("Model: {}", config.model_id);
    log::info!(
        "Concurrent generations per process: {}",
        config.max_concurrent_generations
    );
    log::info!(
        "Default bucket: {}",
        config
            .defaults
            .storage
            .bucket
            .as_deref()
            .unwrap_or("<none, must be sent per request>")
    );
}
