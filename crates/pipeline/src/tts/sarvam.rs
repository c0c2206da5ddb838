//! Sarvam AI text-to-speech client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use phone_agent_config::{
    constants::{audio, endpoints, sarvam, timeouts},
    Settings,
};
use phone_agent_core::{Language, TextToSpeech};

use crate::PipelineError;

/// Sarvam TTS configuration
#[derive(Debug, Clone)]
pub struct SarvamTtsConfig {
    pub url: String,
    pub api_key: String,
    /// Model name (e.g. "bulbul:v2")
    pub model: String,
    pub speaker: String,
    pub pitch: f32,
    pub pace: f32,
    pub loudness: f32,
    /// Output sample rate; 8kHz skips the resample before the wire
    pub sample_rate: u32,
    pub enable_preprocessing: bool,
    pub timeout_ms: u64,
}

impl Default for SarvamTtsConfig {
    fn default() -> Self {
        Self {
            url: endpoints::SARVAM_TTS.to_string(),
            api_key: String::new(),
            model: sarvam::TTS_MODEL.to_string(),
            speaker: sarvam::SPEAKER.to_string(),
            pitch: 0.0,
            pace: 1.0,
            loudness: 1.5,
            sample_rate: audio::TELEPHONY_SAMPLE_RATE,
            enable_preprocessing: true,
            timeout_ms: timeouts::TTS_TIMEOUT_MS,
        }
    }
}

impl SarvamTtsConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let s = &settings.sarvam;
        Self {
            url: s.tts_url.clone(),
            api_key: s.api_key.clone(),
            model: s.tts_model.clone(),
            speaker: s.speaker.clone(),
            pitch: s.pitch,
            pace: s.pace,
            loudness: s.loudness,
            sample_rate: s.tts_sample_rate,
            enable_preprocessing: s.enable_preprocessing,
            timeout_ms: s.tts_timeout_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    inputs: [&'a str; 1],
    target_language_code: &'a str,
    speaker: &'a str,
    pitch: f32,
    pace: f32,
    loudness: f32,
    speech_sample_rate: u32,
    enable_preprocessing: bool,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(default)]
    audios: Vec<String>,
}

/// Sarvam AI text-to-speech
pub struct SarvamTts {
    config: SarvamTtsConfig,
    client: reqwest::Client,
}

impl SarvamTts {
    pub fn new(config: SarvamTtsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Self::new(SarvamTtsConfig::from_settings(settings))
    }

    async fn generate(&self, text: &str, language: Language) -> Result<Vec<u8>, PipelineError> {
        let started = Instant::now();
        let request = TtsRequest {
            inputs: [text],
            target_language_code: language.tag(),
            speaker: &self.config.speaker,
            pitch: self.config.pitch,
            pace: self.config.pace,
            loudness: self.config.loudness,
            speech_sample_rate: self.config.sample_rate,
            enable_preprocessing: self.config.enable_preprocessing,
            model: &self.config.model,
        };

        let response = self
            .client
            .post(&self.config.url)
            .header("API-Subscription-Key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), language = %language, "TTS request rejected: {}", message);
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: TtsResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(format!("TTS response: {}", e)))?;

        let encoded = body
            .audios
            .first()
            .ok_or_else(|| PipelineError::InvalidResponse("TTS response has no audio".to_string()))?;
        let wav = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| PipelineError::InvalidResponse(format!("TTS audio is not base64: {}", e)))?;

        if wav.is_empty() {
            return Err(PipelineError::InvalidResponse("TTS returned empty audio".to_string()));
        }

        tracing::debug!(
            chars = text.chars().count(),
            bytes = wav.len(),
            language = %language,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "TTS response"
        );
        Ok(wav)
    }
}

#[async_trait]
impl TextToSpeech for SarvamTts {
    async fn synthesize(&self, text: &str, language: Language) -> phone_agent_core::Result<Vec<u8>> {
        self.generate(text, language).await.map_err(|e| e.for_service("tts"))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
