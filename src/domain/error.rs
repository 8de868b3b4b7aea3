//! Domain error types

use thiserror::Error;

/// Error when parsing a duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration format: \"{input}\". Expected <number> followed by h, m or s (e.g., 45s, 2m30s, 1h)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when an audio descriptor violates its invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAudioMeta {
    #[error("Sample rate must be positive, got {0}")]
    SampleRate(u32),

    #[error("Channel count must be at least 1, got {0}")]
    Channels(u8),

    #[error("Bits per sample must be 8, 16, 24 or 32, got {0}")]
    BitsPerSample(u8),
}

/// Error when an unknown pause mode is configured
#[derive(Debug, Clone, Error)]
#[error("Invalid pause mode: \"{input}\". Valid modes are: release-device, keep-device")]
pub struct InvalidPauseMode {
    pub input: String,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}
