//! Reasoning service integration
//!
//! Features:
//! - OpenAI-compatible chat completions backend (Sarvam AI by default)
//! - Adapter to the core `LanguageModel` trait with spoken fallbacks

pub mod adapter;
pub mod backend;

pub use adapter::{ConversationalModel, Fallbacks};
pub use backend::{ChatConfig, FinishReason, GenerationResult, LlmBackend, SarvamChatBackend};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// The service answered, but with an error status
    pub fn is_api(&self) -> bool {
        matches!(self, LlmError::Api { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for phone_agent_core::Error {
    fn from(err: LlmError) -> Self {
        phone_agent_core::Error::collaborator("llm", err.to_string())
    }
}
