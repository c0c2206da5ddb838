//! Per-call audio pipeline for the phone agent
//!
//! This crate provides the real-time loop that sits between the telephony
//! media stream and the speech services:
//! - Adaptive RMS voice activity detection
//! - Speech segmentation with a single in-flight turn per call
//! - Turn orchestration (STT → LLM → TTS)
//! - Real-time paced playback of 20ms mu-law frames
//! - Twilio Media Streams wire protocol
//! - Sarvam AI speech-to-text and text-to-speech clients

pub mod orchestrator;
pub mod pacer;
pub mod protocol;
pub mod segmenter;
pub mod session;
pub mod stt;
pub mod tts;
pub mod vad;

// VAD exports
pub use vad::{AdaptiveVad, ThresholdState, VadConfig, VadDecision};

// Segmentation exports
pub use segmenter::{SegmentEvent, Segmenter, SegmenterConfig, SegmenterState, SpeechSegment};

// Orchestrator exports
pub use orchestrator::{
    CallInfo, OrchestratorConfig, PipelineEvent, RecognitionTracker, TurnLatency, TurnOrchestrator,
    TurnOutcome, TurnStage,
};

// Playback exports
pub use pacer::{MediaSink, OutboundPacer, PacerConfig, PlaybackReport};

// Protocol exports
pub use protocol::{InboundEvent, MediaPayload, OutboundMessage, StartPayload};

// Session exports
pub use session::{CallSession, SessionConfig, SessionEnd, SessionReport, SessionStats};

// Service clients
pub use stt::{SarvamStt, SarvamSttConfig};
pub use tts::{SarvamTts, SarvamTtsConfig};

use phone_agent_core::CodecError;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] phone_agent_core::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PipelineError {
    /// Attribute a failure to the named remote service
    pub fn for_service(self, service: &str) -> phone_agent_core::Error {
        match self {
            PipelineError::Core(err) => err,
            PipelineError::Codec(err) => phone_agent_core::Error::Codec(err),
            PipelineError::ChannelClosed => phone_agent_core::Error::TransportDisconnected,
            other => phone_agent_core::Error::collaborator(service, other.to_string()),
        }
    }
}

impl From<PipelineError> for phone_agent_core::Error {
    fn from(err: PipelineError) -> Self {
        err.for_service("pipeline")
    }
}
