//! Error types for Huddle Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Chat log error: {0}")]
    ChatLog(String),
}

pub type Result<T> = std::result::Result<T, Error>;
