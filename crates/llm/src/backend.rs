//! Chat completions backend
//!
//! Speaks the OpenAI-compatible `chat/completions` protocol, which is what
//! Sarvam AI exposes. Requests are non-streaming; replies on a phone call are
//! short and synthesized in one piece.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use phone_agent_config::{
    constants::{endpoints, sarvam, timeouts},
    Settings,
};
use phone_agent_core::{Turn, TurnRole};

use crate::LlmError;

/// Chat backend configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Full chat completions URL
    pub url: String,
    /// Bearer token
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: endpoints::SARVAM_CHAT.to_string(),
            api_key: String::new(),
            model: sarvam::CHAT_MODEL.to_string(),
            max_tokens: sarvam::MAX_TOKENS,
            temperature: sarvam::TEMPERATURE,
            top_p: sarvam::TOP_P,
            frequency_penalty: sarvam::FREQUENCY_PENALTY,
            presence_penalty: sarvam::PRESENCE_PENALTY,
            timeout: Duration::from_millis(timeouts::LLM_REQUEST_MS),
        }
    }
}

impl ChatConfig {
    /// Sarvam AI defaults with the given key
    pub fn sarvam(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let s = &settings.sarvam;
        Self {
            url: s.chat_url.clone(),
            api_key: s.api_key.clone(),
            model: s.chat_model.clone(),
            max_tokens: s.max_tokens,
            temperature: s.temperature,
            top_p: s.top_p,
            frequency_penalty: s.frequency_penalty,
            presence_penalty: s.presence_penalty,
            timeout: Duration::from_millis(s.llm_timeout_ms),
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    /// Completion tokens, when reported
    pub tokens: usize,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other,
}

/// LLM backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a reply to the conversation so far
    async fn generate(&self, turns: &[Turn]) -> Result<GenerationResult, LlmError>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat backend for Sarvam AI
pub struct SarvamChatBackend {
    config: ChatConfig,
    client: Client,
}

impl SarvamChatBackend {
    pub fn new(config: ChatConfig) -> Result<Self, LlmError> {
        if config.url.is_empty() {
            return Err(LlmError::Configuration("chat URL is empty".to_string()));
        }
        if config.api_key.is_empty() {
            tracing::warn!(url = %config.url, "Chat backend configured without an API key");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        Self::new(ChatConfig::from_settings(settings))
    }

    fn build_request(&self, turns: &[Turn]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: turns.iter().map(ChatMessage::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
        }
    }
}

#[async_trait]
impl LlmBackend for SarvamChatBackend {
    async fn generate(&self, turns: &[Turn]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(turns);

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        let tokens = response.usage.map(|u| u.completion_tokens).unwrap_or(0);

        tracing::debug!(
            model = %self.config.model,
            messages = turns.len(),
            tokens,
            total_time_ms,
            "Chat completion"
        );

        Ok(GenerationResult {
            text: choice.message.content,
            tokens,
            total_time_ms,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("stop") | None => FinishReason::Stop,
                Some("length") => FinishReason::Length,
                Some(_) => FinishReason::Other,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Chat completions wire types
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: usize,
}
