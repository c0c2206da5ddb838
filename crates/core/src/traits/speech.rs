//! Speech processing traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Language, Result};

/// Result of recognizing one speech segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// Transcript text, possibly empty
    pub text: String,
    /// Language the audio was recognized in
    pub language: Language,
}

impl Recognition {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    /// Count of non-whitespace characters in the transcript
    pub fn meaningful_chars(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }

    /// Trimmed transcript, or [`Error::RecognitionEmpty`] when it has fewer
    /// than `min_chars` meaningful characters
    pub fn transcript(&self, min_chars: usize) -> Result<&str> {
        if self.meaningful_chars() < min_chars.max(1) {
            return Err(Error::RecognitionEmpty);
        }
        Ok(self.text.trim())
    }
}

/// Speech-to-Text interface
///
/// Implementations:
/// - `SarvamStt` - Sarvam AI speech-to-text (saarika)
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn SpeechToText> = Arc::new(SarvamStt::new(config)?);
/// let recognition = stt.recognize(&wav, Language::Telugu).await?;
/// println!("Caller said: {}", recognition.text);
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Recognize one complete utterance
    ///
    /// # Arguments
    /// * `wav` - 16-bit mono WAV container
    /// * `language` - Language pinned for the call
    ///
    /// # Returns
    /// Transcript, which may be empty when nothing intelligible was heard
    async fn recognize(&self, wav: &[u8], language: Language) -> Result<Recognition>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
///
/// Implementations:
/// - `SarvamTts` - Sarvam AI text-to-speech (bulbul)
///
/// # Example
///
/// ```ignore
/// let tts: Arc<dyn TextToSpeech> = Arc::new(SarvamTts::new(config)?);
/// let wav = tts.synthesize("నమస్కారం", Language::Telugu).await?;
/// ```
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize text to audio
    ///
    /// # Arguments
    /// * `text` - Text to speak
    /// * `language` - Target language (always the session language)
    ///
    /// # Returns
    /// WAV container at any sample rate. An empty buffer counts as failure.
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
