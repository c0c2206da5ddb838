//! Speech-to-Text
//!
//! Segments are transcribed as whole WAV files by a remote service. The
//! [`SpeechToText`](phone_agent_core::SpeechToText) trait is the seam; the
//! Sarvam client is the production implementation.

mod sarvam;

pub use sarvam::{SarvamStt, SarvamSttConfig};
