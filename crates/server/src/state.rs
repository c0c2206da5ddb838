//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use phone_agent_config::Settings;
use phone_agent_core::{LanguageModel, SpeechToText, TextToSpeech};
use phone_agent_llm::{ConversationalModel, Fallbacks, SarvamChatBackend};
use phone_agent_pipeline::{OrchestratorConfig, SarvamStt, SarvamTts, SessionConfig, TurnOrchestrator};

use crate::session::CallRegistry;
use crate::twilio::TwilioClient;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    /// Live media streams
    pub calls: Arc<CallRegistry>,
    /// Shared by every call; per-call state lives in `CallSession`
    pub orchestrator: Arc<TurnOrchestrator>,
    pub session_config: SessionConfig,
    /// `None` when Twilio credentials are not configured
    pub twilio: Option<TwilioClient>,
}

impl AppState {
    /// Build state wired to the Sarvam AI services
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let stt = SarvamStt::from_settings(&config).map_err(|e| ServerError::Internal(e.to_string()))?;
        let tts = SarvamTts::from_settings(&config).map_err(|e| ServerError::Internal(e.to_string()))?;
        let backend =
            SarvamChatBackend::from_settings(&config).map_err(|e| ServerError::Internal(e.to_string()))?;
        let llm = ConversationalModel::new(backend, Fallbacks::from_settings(&config));

        Self::with_services(config, Arc::new(stt), Arc::new(llm), Arc::new(tts))
    }

    /// Build state around caller-provided speech and language services
    pub fn with_services(
        config: Settings,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Result<Self, ServerError> {
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::from_settings(&config), stt, llm, tts);
        let twilio = TwilioClient::from_config(&config.twilio)?;
        if twilio.is_none() {
            tracing::warn!("Twilio credentials not configured, outbound calls disabled");
        }

        Ok(Self {
            session_config: SessionConfig::from_settings(&config),
            config: Arc::new(config),
            calls: Arc::new(CallRegistry::default()),
            orchestrator: Arc::new(orchestrator),
            twilio,
        })
    }

    pub fn active_calls(&self) -> usize {
        self.calls.count()
    }
}
