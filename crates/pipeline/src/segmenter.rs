//! Speech segmentation
//!
//! Accumulates mu-law frames into utterances using the VAD decision for each
//! frame. At most one segment is in flight: once a segment is handed out the
//! segmenter locks and discards everything until [`Segmenter::release`].
//!
//! ```text
//! Idle ──speech──▶ Speaking ──silence run ≥ threshold──▶ Locked ──release──▶ Idle
//!                     │  └──speech ≥ max (truncate)─────▶ Locked
//!                     ├──complete, too short──▶ Idle
//!                     └──overflow──▶ Idle
//! ```

use std::time::Duration;

use phone_agent_config::{constants::audio::MULAW_BYTES_PER_MS, Settings};

/// Segmentation thresholds in mu-law bytes (8 bytes per ms)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Trailing silence that completes a segment
    pub silence_bytes: usize,
    /// Shorter segments are dropped
    pub min_speech_bytes: usize,
    /// Longer segments are cut here and dispatched
    pub max_speech_bytes: usize,
    /// Speech plus silence beyond this is dropped outright
    pub overflow_bytes: usize,
}

impl SegmenterConfig {
    /// Build from millisecond durations
    pub fn from_millis(silence_ms: u64, min_speech_ms: u64, max_speech_ms: u64, overflow_ms: u64) -> Self {
        let bytes = |ms: u64| ms as usize * MULAW_BYTES_PER_MS;
        Self {
            silence_bytes: bytes(silence_ms),
            min_speech_bytes: bytes(min_speech_ms),
            max_speech_bytes: bytes(max_speech_ms),
            overflow_bytes: bytes(overflow_ms),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let seg = &settings.segmenter;
        Self::from_millis(seg.silence_ms, seg.min_speech_ms, seg.max_speech_ms, seg.overflow_ms)
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        use phone_agent_config::constants::segmenter::{
            MAX_SPEECH_MS, MIN_SPEECH_MS, OVERFLOW_MS, SILENCE_MS,
        };
        Self::from_millis(SILENCE_MS, MIN_SPEECH_MS, MAX_SPEECH_MS, OVERFLOW_MS)
    }
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmenterState {
    /// Waiting for speech
    #[default]
    Idle,
    /// Accumulating an utterance (possibly inside a pause)
    Speaking,
    /// A segment is being processed; frames are discarded
    Locked,
}

/// One complete utterance, as raw mu-law bytes
#[derive(Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    pub audio: Vec<u8>,
    /// Per-call segment counter
    pub sequence: u64,
    /// Cut at the maximum length rather than ended by silence
    pub truncated: bool,
}

impl std::fmt::Debug for SpeechSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSegment")
            .field("bytes", &self.audio.len())
            .field("sequence", &self.sequence)
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl SpeechSegment {
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis((self.audio.len() / MULAW_BYTES_PER_MS) as u64)
    }
}

/// Result of pushing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Silence while idle
    Ignored,
    /// Frame absorbed into the current utterance
    Buffering,
    /// Utterance complete; the segmenter is now locked
    Ready(SpeechSegment),
    /// Utterance ended below the minimum length and was dropped
    TooShort { bytes: usize },
    /// Frame arrived while locked
    Discarded,
    /// Buffers would exceed the hard cap and were cleared
    Overflow { bytes: usize },
}

/// Per-call segmentation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmenterStats {
    pub segments: u64,
    pub too_short: u64,
    pub frames_discarded: u64,
    pub overflows: u64,
}

/// Speech segmenter for one call
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    state: SegmenterState,
    speech: Vec<u8>,
    silence: Vec<u8>,
    stats: SegmenterStats,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            speech: Vec::with_capacity(config.max_speech_bytes),
            silence: Vec::with_capacity(config.silence_bytes),
            config,
            state: SegmenterState::Idle,
            stats: SegmenterStats::default(),
        }
    }

    /// Feed one frame with its VAD decision
    pub fn push(&mut self, frame: &[u8], is_speech: bool) -> SegmentEvent {
        match self.state {
            SegmenterState::Locked => {
                self.stats.frames_discarded += 1;
                SegmentEvent::Discarded
            },
            SegmenterState::Idle if !is_speech => SegmentEvent::Ignored,
            SegmenterState::Idle | SegmenterState::Speaking => {
                self.state = SegmenterState::Speaking;
                if is_speech {
                    // The pause was part of the utterance
                    self.speech.append(&mut self.silence);
                    self.speech.extend_from_slice(frame);

                    if self.speech.len() >= self.config.max_speech_bytes {
                        self.speech.truncate(self.config.max_speech_bytes);
                        tracing::debug!(bytes = self.speech.len(), "Utterance hit maximum length");
                        return self.complete(true);
                    }
                } else {
                    self.silence.extend_from_slice(frame);
                    if self.silence.len() >= self.config.silence_bytes {
                        return self.complete(false);
                    }
                }

                // Only reachable when the silence run outgrows the cap
                let buffered = self.speech.len() + self.silence.len();
                if buffered > self.config.overflow_bytes {
                    return self.overflow(buffered);
                }
                SegmentEvent::Buffering
            },
        }
    }

    fn complete(&mut self, truncated: bool) -> SegmentEvent {
        let audio = std::mem::take(&mut self.speech);
        self.silence.clear();

        if audio.len() < self.config.min_speech_bytes {
            self.state = SegmenterState::Idle;
            self.stats.too_short += 1;
            tracing::debug!(bytes = audio.len(), "Discarding short utterance");
            return SegmentEvent::TooShort { bytes: audio.len() };
        }

        self.state = SegmenterState::Locked;
        self.stats.segments += 1;

        SegmentEvent::Ready(SpeechSegment {
            audio,
            sequence: self.stats.segments,
            truncated,
        })
    }

    fn overflow(&mut self, bytes: usize) -> SegmentEvent {
        tracing::warn!(
            bytes,
            cap = self.config.overflow_bytes,
            "Speech buffer overflow, dropping buffered audio"
        );
        self.speech.clear();
        self.silence.clear();
        self.state = SegmenterState::Idle;
        self.stats.overflows += 1;
        SegmentEvent::Overflow { bytes }
    }

    /// Unlock after the in-flight segment finished, successfully or not
    pub fn release(&mut self) {
        self.speech.clear();
        self.silence.clear();
        self.state = SegmenterState::Idle;
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SegmenterState::Speaking
    }

    pub fn is_locked(&self) -> bool {
        self.state == SegmenterState::Locked
    }

    /// Bytes of speech currently buffered
    pub fn buffered_speech(&self) -> usize {
        self.speech.len()
    }

    /// Bytes in the current silence run
    pub fn buffered_silence(&self) -> usize {
        self.silence.len()
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }
}
