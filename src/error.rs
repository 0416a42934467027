//! Error types for livesub.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivesubError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Recognition backend errors
    #[error("Recognition backend error: {message}")]
    Backend { message: String },

    // Pipeline errors
    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    // Command endpoint errors (reported to HTTP clients as 400s)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LivesubError>;
