//! Error types for homevoice

use thiserror::Error;

/// Result type alias for homevoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, bad values)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transient audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Capture stream is gone and will not produce more audio
    #[error("audio device closed: {0}")]
    DeviceClosed(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Dialog exchange (chat completion) error
    #[error("dialog error: {0}")]
    Dialog(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Home control call error
    #[error("directive error: {0}")]
    Directive(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing error
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the error ends the listening loop rather than a single read
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceClosed(_) | Self::Config(_))
    }
}
