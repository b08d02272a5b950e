use anyhow::{Context, Result};
use std::{
    fmt::Display,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_CAPACITY: usize = 4000;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<LogEntry>,
    file: Option<PathBuf>,
    echo: bool,
}

/// Append-only console log shared between the session and the subprocess
/// reader threads. Every append takes the lock, so lines from stdout and
/// stderr never interleave mid-line.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    state: Arc<Mutex<LogState>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: PathBuf) -> Self {
        let buffer = Self::default();
        buffer.lock().file = Some(path);
        buffer
    }

    /// Mirror every appended line to stderr as it arrives.
    pub fn set_echo(&self, echo: bool) {
        self.lock().echo = echo;
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    pub fn push(&self, level: LogLevel, message: String) {
        let mut state = self.lock();
        if state.echo {
            eprintln!("[{}] {message}", log_level_label(level));
        }
        if let Some(path) = state.file.as_deref() {
            let _ = append_log_file(path, level, &message);
        }
        state.entries.push(LogEntry { level, message });
        if state.entries.len() > LOG_CAPACITY {
            let overflow = state.entries.len() - LOG_CAPACITY;
            state.entries.drain(0..overflow);
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Persistent, timestamped record of subprocess failures.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, error: &dyn Display) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create error log dir")?;
        }
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format error timestamp")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("open error log")?;
        writeln!(file, "[{stamp}] {error}").context("write error log")?;
        Ok(())
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {message}")
}
