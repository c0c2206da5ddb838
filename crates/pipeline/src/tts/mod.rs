//! Text-to-Speech
//!
//! Replies are synthesized in one request per turn and returned as WAV, which
//! the orchestrator transcodes to wire mu-law.

mod sarvam;

pub use sarvam::{SarvamTts, SarvamTtsConfig};
