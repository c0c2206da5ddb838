//! Adaptive RMS voice activity detector
//!
//! Per frame:
//! - volume `V` = RMS of the linear samples
//! - speech when `V > speech_threshold`
//!
//! While the caller is not speaking, frames quieter than
//! `spike_ratio * noise_floor` pull the floor towards `V`:
//!
//! ```text
//! noise_floor      = (1 - a) * noise_floor + a * V
//! speech_threshold = max(multiplier * noise_floor, floor_minimum)
//! ```

use phone_agent_config::Settings;
use phone_agent_core::{audio, AudioFrame, CodecError};

/// Adaptive VAD configuration
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Noise floor at call start
    pub initial_noise_floor: f32,
    /// Speech threshold never drops below this
    pub floor_minimum: f32,
    /// Threshold as a multiple of the noise floor
    pub multiplier: f32,
    /// Smoothing factor for the noise floor (0.0 - 1.0)
    pub smoothing: f32,
    /// Louder frames are treated as spikes and skip the floor update
    pub spike_ratio: f32,
    /// Lower clamp for the noise floor
    pub min_noise_floor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        use phone_agent_config::constants::vad::{
            FLOOR_MINIMUM, INITIAL_NOISE_FLOOR, MIN_NOISE_FLOOR, MULTIPLIER, SMOOTHING,
            SPIKE_RATIO,
        };

        Self {
            initial_noise_floor: INITIAL_NOISE_FLOOR,
            floor_minimum: FLOOR_MINIMUM,
            multiplier: MULTIPLIER,
            smoothing: SMOOTHING,
            spike_ratio: SPIKE_RATIO,
            min_noise_floor: MIN_NOISE_FLOOR,
        }
    }
}

impl VadConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let vad = &settings.vad;
        Self {
            initial_noise_floor: vad.initial_noise_floor,
            floor_minimum: vad.floor_minimum,
            multiplier: vad.multiplier,
            smoothing: vad.smoothing,
            spike_ratio: vad.spike_ratio,
            min_noise_floor: vad.min_noise_floor,
        }
    }
}

/// Current adaptive thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdState {
    pub noise_floor: f32,
    pub speech_threshold: f32,
}

/// Classification of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    /// RMS volume of the frame
    pub volume: f32,
    pub is_speech: bool,
    /// Threshold the frame was compared against
    pub threshold: f32,
}

/// Adaptive voice activity detector, owned by one call session
#[derive(Debug, Clone)]
pub struct AdaptiveVad {
    config: VadConfig,
    state: ThresholdState,
    frames: u64,
    floor_updates: u64,
}

impl AdaptiveVad {
    pub fn new(config: VadConfig) -> Self {
        let noise_floor = config.initial_noise_floor.max(config.min_noise_floor);
        let speech_threshold = (config.multiplier * noise_floor).max(config.floor_minimum);

        Self {
            config,
            state: ThresholdState {
                noise_floor,
                speech_threshold,
            },
            frames: 0,
            floor_updates: 0,
        }
    }

    /// Decode and classify a wire frame.
    ///
    /// `speaking` freezes the thresholds while an utterance is in progress.
    pub fn classify(&mut self, frame: &AudioFrame, speaking: bool) -> Result<VadDecision, CodecError> {
        let pcm = frame.decode()?;
        Ok(self.classify_pcm(&pcm.samples, speaking))
    }

    /// Classify linear samples
    pub fn classify_pcm(&mut self, samples: &[i16], speaking: bool) -> VadDecision {
        let volume = audio::rms(samples);
        let threshold = self.state.speech_threshold;
        let is_speech = volume > threshold;

        self.frames += 1;
        if !speaking && volume < self.config.spike_ratio * self.state.noise_floor {
            self.adapt(volume);
        }

        tracing::trace!(
            volume,
            threshold,
            noise_floor = self.state.noise_floor,
            is_speech,
            "VAD frame"
        );

        VadDecision {
            volume,
            is_speech,
            threshold,
        }
    }

    fn adapt(&mut self, volume: f32) {
        let alpha = self.config.smoothing;
        let floor = (1.0 - alpha) * self.state.noise_floor + alpha * volume;

        self.state.noise_floor = floor.max(self.config.min_noise_floor);
        self.state.speech_threshold =
            (self.config.multiplier * self.state.noise_floor).max(self.config.floor_minimum);
        self.floor_updates += 1;
    }

    pub fn thresholds(&self) -> ThresholdState {
        self.state
    }

    /// Frames classified so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that moved the noise floor
    pub fn floor_updates(&self) -> u64 {
        self.floor_updates
    }

    /// Return to the initial thresholds
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}
