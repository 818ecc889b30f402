//! Huddle Core Library
//!
//! Relay configuration and the per-run chat log.

pub mod chat_log;
pub mod config;
pub mod error;

pub use chat_log::{log_file_name, ChatLog, LogEntry};
pub use config::{RelayConfig, DEFAULT_MAX_FILE_SIZE, DEFAULT_PORT, MAX_CHUNK_SIZE};
pub use error::{Error, Result};
