//! Centralized constants for the phone agent
//!
//! Single source of truth for service endpoints, timeouts and the default
//! tuning of the audio pipeline. Settings defaults are built from these.

/// Remote service endpoints
pub mod endpoints {
    /// Sarvam speech-to-text
    pub const SARVAM_STT: &str = "https://api.sarvam.ai/speech-to-text";

    /// Sarvam text-to-speech
    pub const SARVAM_TTS: &str = "https://api.sarvam.ai/text-to-speech";

    /// Sarvam OpenAI-compatible chat completions
    pub const SARVAM_CHAT: &str = "https://api.sarvam.ai/v1/chat/completions";

    /// Twilio REST API
    pub const TWILIO_API: &str = "https://api.twilio.com";
}

/// Timeout constants (in milliseconds unless noted)
pub mod timeouts {
    pub const STT_TIMEOUT_MS: u64 = 10_000;

    pub const TTS_TIMEOUT_MS: u64 = 15_000;

    pub const LLM_REQUEST_MS: u64 = 10_000;

    /// Session ends after this long without inbound media (seconds)
    pub const INACTIVITY_SECS: u64 = 300;
}

/// Telephony audio
pub mod audio {
    /// Wire sample rate (mu-law, mono)
    pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

    /// Sample rate of the WAV handed to speech-to-text
    pub const STT_SAMPLE_RATE: u32 = 16000;

    /// One 20ms outbound frame
    pub const FRAME_BYTES: usize = 160;

    /// mu-law bytes per millisecond at 8kHz
    pub const MULAW_BYTES_PER_MS: usize = 8;

    /// Segments quieter than this RMS get the recognition gain
    pub const QUIET_RMS: f32 = 500.0;

    pub const QUIET_GAIN: f32 = 2.0;
}

/// Adaptive voice activity detection
pub mod vad {
    pub const INITIAL_NOISE_FLOOR: f32 = 200.0;

    /// Lowest speech threshold, whatever the noise floor does
    pub const FLOOR_MINIMUM: f32 = 300.0;

    pub const MULTIPLIER: f32 = 3.0;

    /// Exponential smoothing factor for the noise floor
    pub const SMOOTHING: f32 = 0.05;

    /// Frames louder than this multiple of the floor do not update it
    pub const SPIKE_RATIO: f32 = 1.5;

    /// Noise floor never decays below this
    pub const MIN_NOISE_FLOOR: f32 = 1.0;
}

/// Speech segmentation (milliseconds)
pub mod segmenter {
    pub const SILENCE_MS: u64 = 200;

    pub const MIN_SPEECH_MS: u64 = 600;

    pub const MAX_SPEECH_MS: u64 = 5_000;

    /// Hard cap on buffered audio
    pub const OVERFLOW_MS: u64 = 10_000;
}

/// Conversation defaults
pub mod conversation {
    pub const SYSTEM_PROMPT: &str = "You are a friendly AI assistant on a phone call. \
        Respond naturally, keep your answers short and conversational, \
        and reply in the caller's language.";

    /// Non-system turns kept in the context window
    pub const MAX_TURNS: usize = 10;

    pub const DEFAULT_LANGUAGE: &str = "te-IN";

    /// Consecutive empty recognitions before escalation
    pub const MAX_RECOGNITION_FAILURES: u32 = 3;

    /// Transcripts with fewer non-whitespace characters count as failures
    pub const MIN_TRANSCRIPT_CHARS: usize = 3;
}

/// Sarvam AI model defaults
pub mod sarvam {
    pub const STT_MODEL: &str = "saarika:v2";

    pub const TTS_MODEL: &str = "bulbul:v2";

    pub const CHAT_MODEL: &str = "sarvam-2b";

    pub const SPEAKER: &str = "anushka";

    pub const TEMPERATURE: f32 = 0.5;

    pub const MAX_TOKENS: u32 = 150;

    pub const TOP_P: f32 = 0.85;

    pub const FREQUENCY_PENALTY: f32 = 0.3;

    pub const PRESENCE_PENALTY: f32 = 0.2;

    /// Spoken when the chat service answers with an error status
    pub const UNAVAILABLE_FALLBACK: &str = "I'm having trouble thinking right now.";

    /// Spoken on transport or parse failures
    pub const ERROR_FALLBACK: &str = "Sorry, I encountered an error.";
}

/// Twilio call flow
pub mod twilio {
    pub const INCOMING_GREETING: &str = "Hello! You are connected to the AI voice assistant.";

    pub const OUTBOUND_GREETING: &str = "Hello! This is an AI assistant calling.";

    pub const SAY_VOICE: &str = "Polly.Aditi";
}
