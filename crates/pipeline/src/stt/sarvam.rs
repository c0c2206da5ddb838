//! Sarvam AI speech-to-text client
//!
//! Posts one WAV file per segment as multipart form data and reads the
//! `transcript` field of the JSON reply.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use phone_agent_config::{
    constants::{endpoints, sarvam, timeouts},
    Settings,
};
use phone_agent_core::{Language, Recognition, SpeechToText};

use crate::PipelineError;

/// Sarvam STT configuration
#[derive(Debug, Clone)]
pub struct SarvamSttConfig {
    pub url: String,
    pub api_key: String,
    /// Model name (e.g. "saarika:v2")
    pub model: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SarvamSttConfig {
    fn default() -> Self {
        Self {
            url: endpoints::SARVAM_STT.to_string(),
            api_key: String::new(),
            model: sarvam::STT_MODEL.to_string(),
            timeout_ms: timeouts::STT_TIMEOUT_MS,
        }
    }
}

impl SarvamSttConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.sarvam.stt_url.clone(),
            api_key: settings.sarvam.api_key.clone(),
            model: settings.sarvam.stt_model.clone(),
            timeout_ms: settings.sarvam.stt_timeout_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    language_code: Option<String>,
}

/// Sarvam AI speech-to-text
pub struct SarvamStt {
    config: SarvamSttConfig,
    client: reqwest::Client,
}

impl SarvamStt {
    pub fn new(config: SarvamSttConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        if config.api_key.is_empty() {
            tracing::warn!("Sarvam STT configured without an API key");
        }

        Ok(Self { config, client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Self::new(SarvamSttConfig::from_settings(settings))
    }

    async fn transcribe(&self, wav: &[u8], language: Language) -> Result<Recognition, PipelineError> {
        let started = Instant::now();

        let file = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("language_code", language.tag())
            .text("model", self.config.model.clone());

        let response = self
            .client
            .post(&self.config.url)
            .header("API-Subscription-Key", &self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), language = %language, "STT request rejected: {}", message);
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(format!("STT response: {}", e)))?;

        // The service may report a more specific language than requested
        let detected = body
            .language_code
            .as_deref()
            .and_then(Language::from_tag)
            .unwrap_or(language);

        tracing::debug!(
            bytes = wav.len(),
            language = %detected,
            chars = body.transcript.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "STT response"
        );

        Ok(Recognition::new(body.transcript, detected))
    }
}

#[async_trait]
impl SpeechToText for SarvamStt {
    async fn recognize(&self, wav: &[u8], language: Language) -> phone_agent_core::Result<Recognition> {
        self.transcribe(wav, language).await.map_err(|e| e.for_service("stt"))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
