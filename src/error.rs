//! Error types for the handset agent

use thiserror::Error;

/// Result type alias for handset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the handset agent
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No attached device is online
    #[error("no Android device connected")]
    DeviceUnavailable,

    /// Friendly name missing from the app registry
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// Package absent from the device, even after the loose search
    #[error("app not installed: {0}")]
    AppNotInstalled(String),

    /// Every launch strategy reported failure
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// Intent classifier call failed or returned nothing usable
    #[error("classification error: {0}")]
    Classification(String),

    /// Capture produced audio that could not be recognized
    #[error("speech was not understood")]
    SpeechUnclear,

    /// Capture backend failed
    #[error("speech service error: {0}")]
    SpeechService(String),

    /// Capture source is exhausted (e.g. stdin reached EOF)
    #[error("speech input closed")]
    InputClosed,

    /// A device-protocol call failed
    #[error("actuation error: {0}")]
    Actuation(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model endpoint error
    #[error("language model error: {0}")]
    Llm(String),

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
}
