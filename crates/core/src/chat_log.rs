//! Per-run chat log
//!
//! One append-only text file per server run, named after the start time.
//! Write-only: nothing reads it back. Failures are reported through
//! `tracing` and never reach the caller, so a full disk cannot disturb
//! message delivery.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::error::{Error, Result};

/// One event worth a line in the chat log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Joined { nickname: String },
    Left { nickname: String },
    Chat { text: String },
    FileShared {
        sender: String,
        filename: String,
        size: u64,
    },
    Rejected { nickname: String, reason: String },
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Joined { nickname } => write!(f, "{} joined the chat", nickname),
            LogEntry::Left { nickname } => write!(f, "{} left the chat", nickname),
            LogEntry::Chat { text } => write!(f, "{}", text.trim_end()),
            LogEntry::FileShared {
                sender,
                filename,
                size,
            } => write!(f, "{} shared file: {} ({} bytes)", sender, filename, size),
            LogEntry::Rejected { nickname, reason } => {
                write!(f, "rejected frame from {}: {}", nickname, reason)
            }
        }
    }
}

/// File name for a run started at `started_at`
pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!("chat_log_{}.txt", started_at.format("%Y%m%d_%H%M%S"))
}

/// Append-only chat log with an explicit open/close lifecycle
#[derive(Debug)]
pub struct ChatLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl ChatLog {
    /// Create `dir` if needed and open a fresh log file inside it
    pub fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::ChatLog(format!("Cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(log_file_name(started_at));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::ChatLog(format!("Cannot open {}: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), "Chat log opened");

        Ok(Self {
            path: Some(path),
            file: Mutex::new(Some(file)),
        })
    }

    /// A log that drops every entry
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one timestamped line
    pub fn record(&self, entry: LogEntry) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), entry);

        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::error!(error = %e, "Failed to write chat log entry");
        }
    }

    /// Flush and release the file. Later entries are dropped.
    pub fn close(&self) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut file) = guard.take() {
            if let Err(e) = file.flush() {
                tracing::error!(error = %e, "Failed to flush chat log");
            }
            tracing::info!("Chat log closed");
        }
    }
}

impl Drop for ChatLog {
    fn drop(&mut self) {
        self.close();
    }
}
