//! Error types for the cub device

use thiserror::Error;

/// Result type alias for device operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the device loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text stream error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// The recognizer's maximum stream duration was reached
    #[error("transcription stream duration limit reached")]
    StreamLimitExceeded,

    /// Reachability probe failed
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Answer lookup failed (transport, status, or body)
    #[error("answer service error: {0}")]
    Service(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Status indicator setup error
    #[error("indicator error: {0}")]
    Indicator(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Whether this error is the expected end of a recognition session
    #[must_use]
    pub const fn is_stream_limit(&self) -> bool {
        matches!(self, Self::StreamLimitExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_limit_classification() {
        assert!(Error::StreamLimitExceeded.is_stream_limit());
        assert!(!Error::Transcription("closed".to_string()).is_stream_limit());
        assert!(!Error::Service("500".to_string()).is_stream_limit());
    }
}
