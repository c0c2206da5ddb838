//! Conversational model adapter
//!
//! Bridges an [`LlmBackend`] to the core [`LanguageModel`] trait. A caller on
//! the phone should always hear something, so backend failures become a short
//! spoken apology instead of an error.

use std::sync::Arc;

use async_trait::async_trait;

use phone_agent_config::{constants::sarvam, Settings};
use phone_agent_core::{LanguageModel, Result, Turn};

use crate::backend::LlmBackend;
use crate::LlmError;

/// Replies used when the backend cannot answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallbacks {
    /// The service answered with an error status
    pub unavailable: String,
    /// Transport, timeout or parse failure
    pub error: String,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            unavailable: sarvam::UNAVAILABLE_FALLBACK.to_string(),
            error: sarvam::ERROR_FALLBACK.to_string(),
        }
    }
}

impl Fallbacks {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            unavailable: settings.sarvam.unavailable_fallback.clone(),
            error: settings.sarvam.error_fallback.clone(),
        }
    }

    fn for_error(&self, err: &LlmError) -> &str {
        if err.is_api() {
            &self.unavailable
        } else {
            &self.error
        }
    }
}

/// `LanguageModel` over an `LlmBackend`, never failing
///
/// # Example
///
/// ```ignore
/// let backend = SarvamChatBackend::from_settings(&settings)?;
/// let llm: Arc<dyn LanguageModel> = Arc::new(ConversationalModel::new(backend, Fallbacks::default()));
/// ```
pub struct ConversationalModel {
    backend: Arc<dyn LlmBackend>,
    fallbacks: Fallbacks,
}

impl ConversationalModel {
    pub fn new<B: LlmBackend + 'static>(backend: B, fallbacks: Fallbacks) -> Self {
        Self::from_arc(Arc::new(backend), fallbacks)
    }

    pub fn from_arc(backend: Arc<dyn LlmBackend>, fallbacks: Fallbacks) -> Self {
        Self { backend, fallbacks }
    }

    pub fn fallbacks(&self) -> &Fallbacks {
        &self.fallbacks
    }
}

#[async_trait]
impl LanguageModel for ConversationalModel {
    async fn respond(&self, turns: &[Turn]) -> Result<String> {
        let result = self.backend.generate(turns).await.and_then(|result| {
            let text = result.text.trim();
            if text.is_empty() {
                Err(LlmError::InvalidResponse("empty completion".to_string()))
            } else {
                Ok(text.to_string())
            }
        });

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(model = self.backend.model_name(), error = %e, "LLM failed, using fallback reply");
                Ok(self.fallbacks.for_error(&e).to_string())
            },
        }
    }

    fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChatConfig, FinishReason, GenerationResult, SarvamChatBackend};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Mock backend for testing
    struct MockBackend {
        response: std::result::Result<String, fn() -> LlmError>,
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn generate(&self, _turns: &[Turn]) -> std::result::Result<GenerationResult, LlmError> {
            match &self.response {
                Ok(text) => Ok(GenerationResult {
                    text: text.clone(),
                    tokens: 4,
                    total_time_ms: 10,
                    finish_reason: FinishReason::Stop,
                }),
                Err(make) => Err(make()),
            }
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn model(response: std::result::Result<String, fn() -> LlmError>) -> ConversationalModel {
        ConversationalModel::new(MockBackend { response }, Fallbacks::default())
    }

    #[tokio::test]
    async fn test_passes_reply_through() {
        let reply = model(Ok("  Sure, I can help.\n".to_string()))
            .respond(&[Turn::user("help")])
            .await
            .unwrap();
        assert_eq!(reply, "Sure, I can help.");
    }

    #[tokio::test]
    async fn test_api_error_uses_unavailable_fallback() {
        let reply = model(Err(|| LlmError::Api {
            status: 503,
            message: "busy".to_string(),
        }))
        .respond(&[Turn::user("hi")])
        .await
        .unwrap();
        assert_eq!(reply, "I'm having trouble thinking right now.");
    }

    #[tokio::test]
    async fn test_transport_errors_use_error_fallback() {
        for make in [
            (|| LlmError::Timeout) as fn() -> LlmError,
            || LlmError::Network("connection reset".to_string()),
            || LlmError::InvalidResponse("bad json".to_string()),
        ] {
            let reply = model(Err(make)).respond(&[Turn::user("hi")]).await.unwrap();
            assert_eq!(reply, "Sorry, I encountered an error.");
        }
    }

    #[tokio::test]
    async fn test_empty_completion_uses_error_fallback() {
        let reply = model(Ok("   ".to_string())).respond(&[Turn::user("hi")]).await.unwrap();
        assert_eq!(reply, "Sorry, I encountered an error.");
    }

    #[tokio::test]
    async fn test_custom_fallbacks_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let backend = SarvamChatBackend::new(ChatConfig {
            url: server.uri(),
            ..ChatConfig::sarvam("key")
        })
        .unwrap();
        let fallbacks = Fallbacks {
            unavailable: "ఒక్క నిమిషం".to_string(),
            error: "క్షమించండి".to_string(),
        };
        let llm = ConversationalModel::new(backend, fallbacks);

        let reply = llm.respond(&[Turn::user("hello")]).await.unwrap();
        assert_eq!(reply, "ఒక్క నిమిషం");
        assert_eq!(llm.model_name(), "sarvam-2b");
    }
}
