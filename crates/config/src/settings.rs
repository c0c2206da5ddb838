//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use phone_agent_core::Language;

use crate::constants::{audio, conversation, endpoints, sarvam, segmenter, timeouts, twilio, vad};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Recognition audio preparation
    #[serde(default)]
    pub audio: AudioConfig,

    /// Adaptive voice activity detection
    #[serde(default)]
    pub vad: VadConfig,

    /// Speech segmentation durations
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// Outbound playback
    #[serde(default)]
    pub pacer: PacerConfig,

    /// Conversation and escalation policy
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Sarvam AI speech and chat services
    #[serde(default)]
    pub sarvam: SarvamConfig,

    /// Twilio webhooks and REST API
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_audio()?;
        self.validate_vad()?;
        self.validate_segmenter()?;
        self.validate_conversation()?;
        self.validate_sarvam()?;

        if self.pacer.frame_bytes == 0 {
            return Err(invalid("pacer.frame_bytes", "Must be at least 1"));
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }

        if self.server.timeout_seconds == 0 {
            return Err(invalid("server.timeout_seconds", "Timeout must be at least 1 second"));
        }

        if self.environment.is_production() && self.server.cors_enabled && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 Only http://localhost:3000 will be allowed."
            );
        }

        Ok(())
    }

    fn validate_audio(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;

        if audio.stt_sample_rate < 8000 {
            return Err(invalid(
                "audio.stt_sample_rate",
                format!("Must be at least 8000 Hz, got {}", audio.stt_sample_rate),
            ));
        }

        if audio.quiet_gain < 1.0 {
            return Err(invalid(
                "audio.quiet_gain",
                format!("Must be at least 1.0, got {}", audio.quiet_gain),
            ));
        }

        if audio.quiet_rms < 0.0 {
            return Err(invalid("audio.quiet_rms", "Cannot be negative"));
        }

        Ok(())
    }

    fn validate_vad(&self) -> Result<(), ConfigError> {
        let vad = &self.vad;

        for (field, value) in [
            ("vad.initial_noise_floor", vad.initial_noise_floor),
            ("vad.floor_minimum", vad.floor_minimum),
            ("vad.multiplier", vad.multiplier),
            ("vad.min_noise_floor", vad.min_noise_floor),
        ] {
            if !(value > 0.0) {
                return Err(invalid(field, format!("Must be positive, got {}", value)));
            }
        }

        if !(vad.smoothing > 0.0 && vad.smoothing < 1.0) {
            return Err(invalid(
                "vad.smoothing",
                format!("Must be between 0.0 and 1.0 (exclusive), got {}", vad.smoothing),
            ));
        }

        if !(vad.spike_ratio > 1.0) {
            return Err(invalid(
                "vad.spike_ratio",
                format!("Must be greater than 1.0, got {}", vad.spike_ratio),
            ));
        }

        Ok(())
    }

    fn validate_segmenter(&self) -> Result<(), ConfigError> {
        let seg = &self.segmenter;

        if seg.silence_ms == 0 {
            return Err(invalid("segmenter.silence_ms", "Must be at least 1ms"));
        }

        if seg.min_speech_ms >= seg.max_speech_ms {
            return Err(invalid(
                "segmenter.min_speech_ms",
                format!(
                    "Must be below max_speech_ms ({}), got {}",
                    seg.max_speech_ms, seg.min_speech_ms
                ),
            ));
        }

        // A maximal utterance plus its pause must fit below the cap
        let needed = seg.max_speech_ms.saturating_add(seg.silence_ms);
        if seg.overflow_ms < needed {
            return Err(invalid(
                "segmenter.overflow_ms",
                format!(
                    "Must be at least max_speech_ms + silence_ms ({}), got {}",
                    needed, seg.overflow_ms
                ),
            ));
        }

        Ok(())
    }

    fn validate_conversation(&self) -> Result<(), ConfigError> {
        let conv = &self.conversation;

        if conv.max_turns == 0 {
            return Err(invalid("conversation.max_turns", "Must keep at least 1 turn"));
        }

        if Language::from_tag(&conv.default_language).is_none() {
            return Err(invalid(
                "conversation.default_language",
                format!("Unsupported language '{}'", conv.default_language),
            ));
        }

        if conv.max_recognition_failures == 0 {
            return Err(invalid("conversation.max_recognition_failures", "Must be at least 1"));
        }

        if conv.inactivity_timeout_secs == 0 {
            return Err(invalid("conversation.inactivity_timeout_secs", "Must be at least 1 second"));
        }

        Ok(())
    }

    fn validate_sarvam(&self) -> Result<(), ConfigError> {
        if self.sarvam.api_key.is_empty() {
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("sarvam.api_key".to_string()));
            }
            tracing::warn!("sarvam.api_key is not set; speech and chat requests will be rejected");
        }

        if self.sarvam.max_tokens == 0 {
            return Err(invalid("sarvam.max_tokens", "Must be at least 1"));
        }

        if !(0.0..=2.0).contains(&self.sarvam.temperature) {
            return Err(invalid(
                "sarvam.temperature",
                format!("Must be between 0.0 and 2.0, got {}", self.sarvam.temperature),
            ));
        }

        Ok(())
    }

    /// Language calls start in unless the stream says otherwise
    pub fn default_language(&self) -> Language {
        Language::from_tag(&self.conversation.default_language).unwrap_or_default()
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn default_true() -> bool {
    true
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public hostname used in stream URLs (falls back to the request Host header)
    #[serde(default)]
    pub public_host: Option<String>,

    /// Request timeout in seconds (webhooks only, not the media stream)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8000)
}
fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_host: None,
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Recognition audio preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of the WAV sent to speech-to-text
    #[serde(default = "default_stt_sample_rate")]
    pub stt_sample_rate: u32,

    /// Segments with RMS below this are amplified
    #[serde(default = "default_quiet_rms")]
    pub quiet_rms: f32,

    /// Gain for quiet segments (1.0 disables)
    #[serde(default = "default_quiet_gain")]
    pub quiet_gain: f32,

    /// Subtract DC offset before recognition
    #[serde(default = "default_true")]
    pub remove_dc: bool,
}

fn default_stt_sample_rate() -> u32 {
    audio::STT_SAMPLE_RATE
}
fn default_quiet_rms() -> f32 {
    audio::QUIET_RMS
}
fn default_quiet_gain() -> f32 {
    audio::QUIET_GAIN
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            stt_sample_rate: default_stt_sample_rate(),
            quiet_rms: default_quiet_rms(),
            quiet_gain: default_quiet_gain(),
            remove_dc: true,
        }
    }
}

/// Adaptive VAD thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_initial_noise_floor")]
    pub initial_noise_floor: f32,

    /// Lowest speech threshold
    #[serde(default = "default_floor_minimum")]
    pub floor_minimum: f32,

    /// Speech threshold as a multiple of the noise floor
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,

    /// Noise floor smoothing factor (alpha)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,

    /// Frames louder than `spike_ratio * noise_floor` never update the floor
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f32,

    #[serde(default = "default_min_noise_floor")]
    pub min_noise_floor: f32,
}

fn default_initial_noise_floor() -> f32 {
    vad::INITIAL_NOISE_FLOOR
}
fn default_floor_minimum() -> f32 {
    vad::FLOOR_MINIMUM
}
fn default_multiplier() -> f32 {
    vad::MULTIPLIER
}
fn default_smoothing() -> f32 {
    vad::SMOOTHING
}
fn default_spike_ratio() -> f32 {
    vad::SPIKE_RATIO
}
fn default_min_noise_floor() -> f32 {
    vad::MIN_NOISE_FLOOR
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            initial_noise_floor: default_initial_noise_floor(),
            floor_minimum: default_floor_minimum(),
            multiplier: default_multiplier(),
            smoothing: default_smoothing(),
            spike_ratio: default_spike_ratio(),
            min_noise_floor: default_min_noise_floor(),
        }
    }
}

/// Segmentation durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Trailing silence that ends an utterance
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,

    /// Shorter utterances are discarded
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,

    /// Longer utterances are cut and dispatched
    #[serde(default = "default_max_speech_ms")]
    pub max_speech_ms: u64,

    /// Hard cap on speech plus silence before everything is dropped
    #[serde(default = "default_overflow_ms")]
    pub overflow_ms: u64,
}

fn default_silence_ms() -> u64 {
    segmenter::SILENCE_MS
}
fn default_min_speech_ms() -> u64 {
    segmenter::MIN_SPEECH_MS
}
fn default_max_speech_ms() -> u64 {
    segmenter::MAX_SPEECH_MS
}
fn default_overflow_ms() -> u64 {
    segmenter::OVERFLOW_MS
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_ms: default_silence_ms(),
            min_speech_ms: default_min_speech_ms(),
            max_speech_ms: default_max_speech_ms(),
            overflow_ms: default_overflow_ms(),
        }
    }
}

/// Outbound playback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Bytes per outbound media message
    #[serde(default = "default_frame_bytes")]
    pub frame_bytes: usize,

    /// Send `clear` before each reply to flush queued audio
    #[serde(default = "default_true")]
    pub clear_before_playback: bool,
}

fn default_frame_bytes() -> usize {
    audio::FRAME_BYTES
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            frame_bytes: default_frame_bytes(),
            clear_before_playback: true,
        }
    }
}

/// Conversation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Non-system turns kept in context
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// BCP-47 tag of the default call language
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Consecutive recognition failures before escalation
    #[serde(default = "default_max_recognition_failures")]
    pub max_recognition_failures: u32,

    /// Minimum non-whitespace characters for a usable transcript
    #[serde(default = "default_min_transcript_chars")]
    pub min_transcript_chars: usize,

    /// Spoken to the caller when escalation triggers
    #[serde(default)]
    pub handoff_message: Option<String>,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

fn default_system_prompt() -> String {
    conversation::SYSTEM_PROMPT.to_string()
}
fn default_max_turns() -> usize {
    conversation::MAX_TURNS
}
fn default_language() -> String {
    conversation::DEFAULT_LANGUAGE.to_string()
}
fn default_max_recognition_failures() -> u32 {
    conversation::MAX_RECOGNITION_FAILURES
}
fn default_min_transcript_chars() -> usize {
    conversation::MIN_TRANSCRIPT_CHARS
}
fn default_inactivity_timeout_secs() -> u64 {
    timeouts::INACTIVITY_SECS
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_turns: default_max_turns(),
            default_language: default_language(),
            max_recognition_failures: default_max_recognition_failures(),
            min_transcript_chars: default_min_transcript_chars(),
            handoff_message: None,
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

/// Sarvam AI services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarvamConfig {
    /// API subscription key (set via PHONE_AGENT__SARVAM__API_KEY or SARVAM_API_KEY)
    #[serde(default = "default_sarvam_api_key")]
    pub api_key: String,

    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// TTS voice
    #[serde(default = "default_speaker")]
    pub speaker: String,

    #[serde(default)]
    pub pitch: f32,

    #[serde(default = "default_pace")]
    pub pace: f32,

    #[serde(default = "default_loudness")]
    pub loudness: f32,

    /// Rate requested from TTS (matching the wire avoids a resample)
    #[serde(default = "default_tts_sample_rate")]
    pub tts_sample_rate: u32,

    #[serde(default = "default_true")]
    pub enable_preprocessing: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,

    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,

    #[serde(default = "default_stt_timeout_ms")]
    pub stt_timeout_ms: u64,

    #[serde(default = "default_tts_timeout_ms")]
    pub tts_timeout_ms: u64,

    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,

    /// Reply used when the chat service returns an error status
    #[serde(default = "default_unavailable_fallback")]
    pub unavailable_fallback: String,

    /// Reply used on transport or parse failures
    #[serde(default = "default_error_fallback")]
    pub error_fallback: String,
}

fn default_sarvam_api_key() -> String {
    std::env::var("SARVAM_API_KEY").unwrap_or_default()
}
fn default_stt_url() -> String {
    endpoints::SARVAM_STT.to_string()
}
fn default_tts_url() -> String {
    endpoints::SARVAM_TTS.to_string()
}
fn default_chat_url() -> String {
    endpoints::SARVAM_CHAT.to_string()
}
fn default_stt_model() -> String {
    sarvam::STT_MODEL.to_string()
}
fn default_tts_model() -> String {
    sarvam::TTS_MODEL.to_string()
}
fn default_chat_model() -> String {
    sarvam::CHAT_MODEL.to_string()
}
fn default_speaker() -> String {
    sarvam::SPEAKER.to_string()
}
fn default_pace() -> f32 {
    1.0
}
fn default_loudness() -> f32 {
    1.5
}
fn default_tts_sample_rate() -> u32 {
    audio::TELEPHONY_SAMPLE_RATE
}
fn default_temperature() -> f32 {
    sarvam::TEMPERATURE
}
fn default_max_tokens() -> u32 {
    sarvam::MAX_TOKENS
}
fn default_top_p() -> f32 {
    sarvam::TOP_P
}
fn default_frequency_penalty() -> f32 {
    sarvam::FREQUENCY_PENALTY
}
fn default_presence_penalty() -> f32 {
    sarvam::PRESENCE_PENALTY
}
fn default_stt_timeout_ms() -> u64 {
    timeouts::STT_TIMEOUT_MS
}
fn default_tts_timeout_ms() -> u64 {
    timeouts::TTS_TIMEOUT_MS
}
fn default_llm_timeout_ms() -> u64 {
    timeouts::LLM_REQUEST_MS
}
fn default_unavailable_fallback() -> String {
    sarvam::UNAVAILABLE_FALLBACK.to_string()
}
fn default_error_fallback() -> String {
    sarvam::ERROR_FALLBACK.to_string()
}

impl Default for SarvamConfig {
    fn default() -> Self {
        Self {
            api_key: default_sarvam_api_key(),
            stt_url: default_stt_url(),
            tts_url: default_tts_url(),
            chat_url: default_chat_url(),
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
            chat_model: default_chat_model(),
            speaker: default_speaker(),
            pitch: 0.0,
            pace: default_pace(),
            loudness: default_loudness(),
            tts_sample_rate: default_tts_sample_rate(),
            enable_preprocessing: true,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: default_frequency_penalty(),
            presence_penalty: default_presence_penalty(),
            stt_timeout_ms: default_stt_timeout_ms(),
            tts_timeout_ms: default_tts_timeout_ms(),
            llm_timeout_ms: default_llm_timeout_ms(),
            unavailable_fallback: default_unavailable_fallback(),
            error_fallback: default_error_fallback(),
        }
    }
}

/// Twilio webhooks and outbound calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default = "default_account_sid")]
    pub account_sid: String,

    #[serde(default = "default_auth_token")]
    pub auth_token: String,

    /// Caller ID for outbound calls
    #[serde(default = "default_phone_number")]
    pub phone_number: String,

    /// Public base URL Twilio calls back into (e.g. `https://agent.example.com`)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// `<Say>` before connecting an incoming call (empty to skip)
    #[serde(default = "default_incoming_greeting")]
    pub incoming_greeting: String,

    #[serde(default = "default_outbound_greeting")]
    pub outbound_greeting: String,

    #[serde(default = "default_say_voice")]
    pub say_voice: String,
}

fn default_account_sid() -> String {
    env_or("TWILIO_ACCOUNT_SID", "")
}
fn default_auth_token() -> String {
    env_or("TWILIO_AUTH_TOKEN", "")
}
fn default_phone_number() -> String {
    env_or("TWILIO_PHONE_NUMBER", "")
}
fn default_public_base_url() -> String {
    let base = env_or("BASE_URL", "localhost:8000");
    if base.starts_with("http://") || base.starts_with("https://") {
        base
    } else {
        format!("http://{}", base)
    }
}
fn default_api_base() -> String {
    endpoints::TWILIO_API.to_string()
}
fn default_incoming_greeting() -> String {
    twilio::INCOMING_GREETING.to_string()
}
fn default_outbound_greeting() -> String {
    twilio::OUTBOUND_GREETING.to_string()
}
fn default_say_voice() -> String {
    twilio::SAY_VOICE.to_string()
}

impl TwilioConfig {
    /// Whether outbound calls can be placed
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.phone_number.is_empty()
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: default_account_sid(),
            auth_token: default_auth_token(),
            phone_number: default_phone_number(),
            public_base_url: default_public_base_url(),
            api_base: default_api_base(),
            incoming_greeting: default_incoming_greeting(),
            outbound_greeting: default_outbound_greeting(),
            say_voice: default_say_voice(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (PHONE_AGENT__ prefix, `__` separated)
/// 2. config/{env}.(toml|yaml) (if env specified)
/// 3. config/default.(toml|yaml)
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings using `dir` as the configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("PHONE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.audio.stt_sample_rate, 16000);
        assert_eq!(settings.segmenter.silence_ms, 200);
        assert_eq!(settings.pacer.frame_bytes, 160);
        assert_eq!(settings.conversation.max_turns, 10);
        assert_eq!(settings.default_language(), Language::Telugu);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_vad_validation() {
        let mut settings = Settings::default();
        settings.vad.floor_minimum = 0.0;
        assert!(settings.validate_vad().is_err());
        settings.vad.floor_minimum = 300.0;

        settings.vad.spike_ratio = 1.0;
        assert!(settings.validate_vad().is_err());
        settings.vad.spike_ratio = 1.5;

        settings.vad.smoothing = 1.0;
        assert!(settings.validate_vad().is_err());
        settings.vad.smoothing = 0.05;

        settings.vad.multiplier = f32::NAN;
        assert!(settings.validate_vad().is_err());
        settings.vad.multiplier = 3.0;

        assert!(settings.validate_vad().is_ok());
    }

    #[test]
    fn test_segmenter_validation() {
        let mut settings = Settings::default();

        settings.segmenter.min_speech_ms = 5000;
        assert!(settings.validate_segmenter().is_err());
        settings.segmenter.min_speech_ms = 600;

        settings.segmenter.max_speech_ms = 20_000;
        assert!(settings.validate_segmenter().is_err());
        settings.segmenter.max_speech_ms = 5000;

        settings.segmenter.silence_ms = 0;
        assert!(settings.validate_segmenter().is_err());
        settings.segmenter.silence_ms = 200;

        settings.segmenter.overflow_ms = 5000;
        assert!(settings.validate_segmenter().is_err());
        settings.segmenter.overflow_ms = 5200;
        assert!(settings.validate_segmenter().is_ok());
        settings.segmenter.overflow_ms = 10_000;

        assert!(settings.validate_segmenter().is_ok());
    }

    #[test]
    fn test_conversation_validation() {
        let mut settings = Settings::default();

        settings.conversation.max_turns = 0;
        assert!(settings.validate_conversation().is_err());
        settings.conversation.max_turns = 10;

        settings.conversation.default_language = "fr-FR".to_string();
        let err = settings.validate_conversation().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "conversation.default_language"));

        settings.conversation.default_language = "hi-IN".to_string();
        assert!(settings.validate_conversation().is_ok());
        assert_eq!(settings.default_language(), Language::Hindi);
    }

    #[test]
    fn test_server_and_pacer_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
        settings.server.port = 8000;

        settings.pacer.frame_bytes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_production_requires_api_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.sarvam.api_key = String::new();
        assert!(matches!(settings.validate_sarvam(), Err(ConfigError::MissingField(_))));

        settings.sarvam.api_key = "test-key".to_string();
        assert!(settings.validate_sarvam().is_ok());

        settings.environment = RuntimeEnvironment::Development;
        settings.sarvam.api_key = String::new();
        assert!(settings.validate_sarvam().is_ok());
    }

    #[test]
    fn test_twilio_configured() {
        let mut twilio = TwilioConfig::default();
        twilio.account_sid = "AC123".to_string();
        twilio.auth_token = "token".to_string();
        twilio.phone_number = String::new();
        assert!(!twilio.is_configured());

        twilio.phone_number = "+15550001111".to_string();
        assert!(twilio.is_configured());
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            default,
            "[segmenter]\nsilence_ms = 300\n\n[conversation]\ndefault_language = \"en-IN\"\nmax_turns = 6"
        )
        .unwrap();

        let mut staging = std::fs::File::create(dir.path().join("staging.toml")).unwrap();
        writeln!(
            staging,
            "environment = \"development\"\n\n[conversation]\nmax_turns = 4\nhandoff_message = \"Connecting you to a person.\""
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.segmenter.silence_ms, 300);
        assert_eq!(settings.conversation.max_turns, 4);
        assert_eq!(settings.default_language(), Language::English);
        assert_eq!(
            settings.conversation.handoff_message.as_deref(),
            Some("Connecting you to a person.")
        );
        // Untouched sections keep their defaults
        assert_eq!(settings.segmenter.min_speech_ms, 600);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(default, "[vad]\nfloor_minimum = -5.0").unwrap();

        let result = load_settings_from(dir.path(), None);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(dir.path(), Some("missing")).unwrap();
        assert_eq!(settings.pacer.frame_bytes, 160);
    }
}
