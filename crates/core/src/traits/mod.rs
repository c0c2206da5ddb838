//! Collaborator traits for the phone agent
//!
//! The call pipeline talks to three remote services, each behind a trait so
//! backends can be swapped and tests can inject doubles:
//!
//! ```text
//! Speech:
//!   - SpeechToText: WAV → transcript
//!   - TextToSpeech: text → WAV
//!
//! Reasoning:
//!   - LanguageModel: conversation turns → reply text
//! ```
//!
//! Implementations are shared across calls as `Arc<dyn Trait>` and must be
//! `Send + Sync + 'static`.

mod llm;
mod speech;

pub use llm::LanguageModel;
pub use speech::{Recognition, SpeechToText, TextToSpeech};
