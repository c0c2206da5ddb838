//! Core traits and types for the phone agent
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frame types and the telephony codec (mu-law, resampling, WAV)
//! - Language definitions
//! - Conversation turns and the per-call context window
//! - Collaborator traits (STT, LLM, TTS)
//! - Error types

pub mod audio;
pub mod codec;
pub mod conversation;
pub mod error;
pub mod language;
pub mod traits;

pub use audio::{
    AudioEncoding, AudioFrame, PcmBuffer, SampleRate, TELEPHONY_FRAME_BYTES,
    TELEPHONY_SAMPLE_RATE,
};
pub use codec::{CodecError, Conditioning, WavAudio};
pub use conversation::{ConversationContext, Turn, TurnRole};
pub use error::{Error, Result};
pub use language::Language;
pub use traits::{LanguageModel, Recognition, SpeechToText, TextToSpeech};
