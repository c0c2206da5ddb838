//! Error types for the phone agent

use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;

/// Main error type for the phone agent
#[derive(Error, Debug)]
pub enum Error {
    /// Audio could not be transcoded. The affected segment is skipped.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Recognition produced no usable transcript
    #[error("Speech was not recognized")]
    RecognitionEmpty,

    /// A remote speech or reasoning service failed
    #[error("{service} failed: {message}")]
    Collaborator { service: String, message: String },

    #[error("Transport disconnected")]
    TransportDisconnected,

    #[error("Session timed out after {0:?} without media")]
    SessionTimeout(Duration),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl Error {
    /// Create a collaborator failure
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether this error should end the whole session rather than one turn
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportDisconnected | Error::SessionTimeout(_))
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Codec(_) => "codec",
            Error::RecognitionEmpty => "recognition_empty",
            Error::Collaborator { .. } => "collaborator",
            Error::TransportDisconnected => "transport",
            Error::SessionTimeout(_) => "timeout",
            Error::UnsupportedLanguage(_) => "language",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(Error::TransportDisconnected.is_fatal());
        assert!(Error::SessionTimeout(Duration::from_secs(300)).is_fatal());
        assert!(!Error::collaborator("stt", "boom").is_fatal());
        assert!(!Error::from(CodecError::Empty).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::collaborator("tts", "HTTP 500");
        assert_eq!(err.to_string(), "tts failed: HTTP 500");
        assert_eq!(err.kind(), "collaborator");
    }
}
