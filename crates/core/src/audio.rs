//! Audio frame types and utilities

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::codec::{self, CodecError};

/// Narrow-band telephony sample rate (mu-law on the wire)
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Bytes in one 20ms mu-law frame at 8kHz
pub const TELEPHONY_FRAME_BYTES: usize = 160;

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    #[default]
    Hz8000,
    /// 16kHz - Standard speech recognition
    Hz16000,
    /// 22.05kHz - TTS output
    Hz22050,
    /// 24kHz - TTS output
    Hz24000,
    /// 44.1kHz - CD quality
    Hz44100,
    /// 48kHz - Professional audio
    Hz48000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Map a raw rate onto a known variant
    pub fn from_u32(rate: u32) -> Option<Self> {
        match rate {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            22050 => Some(SampleRate::Hz22050),
            24000 => Some(SampleRate::Hz24000),
            44100 => Some(SampleRate::Hz44100),
            48000 => Some(SampleRate::Hz48000),
            _ => None,
        }
    }

    /// Get frame size for 20ms chunk
    pub fn frame_size_20ms(&self) -> usize {
        (self.as_u32() as usize * 20) / 1000
    }

    /// Get samples per millisecond
    pub fn samples_per_ms(&self) -> usize {
        self.as_u32() as usize / 1000
    }
}

/// Wire encodings accepted from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AudioEncoding {
    /// G.711 mu-law, one byte per sample (telephony)
    #[default]
    Mulaw,
    /// 16-bit signed PCM (little-endian)
    Pcm16,
}

impl AudioEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioEncoding::Mulaw => 1,
            AudioEncoding::Pcm16 => 2,
        }
    }
}

/// Decoded 16-bit linear PCM, mono
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Root-mean-square amplitude in linear 16-bit units
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Root-mean-square of sample magnitudes. Empty input is silent.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// One inbound wire frame: the encoded payload of a single media message.
///
/// Frames are ephemeral. They are decoded once for voice activity detection and
/// their raw bytes are handed to the segmenter.
#[derive(Clone)]
pub struct AudioFrame {
    /// Encoded payload as received
    pub payload: Vec<u8>,
    /// Payload encoding
    pub encoding: AudioEncoding,
    /// Frame sequence number for ordering
    pub sequence: u64,
    /// When the frame was received
    pub received_at: Instant,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("payload_len", &self.payload.len())
            .field("encoding", &self.encoding)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl AudioFrame {
    /// Create a frame from raw payload bytes
    pub fn new(payload: Vec<u8>, encoding: AudioEncoding, sequence: u64) -> Self {
        Self {
            payload,
            encoding,
            sequence,
            received_at: Instant::now(),
        }
    }

    /// Create a mu-law telephony frame
    pub fn mulaw(payload: Vec<u8>, sequence: u64) -> Self {
        Self::new(payload, AudioEncoding::Mulaw, sequence)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Playback duration at the telephony rate
    pub fn duration(&self) -> Duration {
        let samples = self.payload.len() / self.encoding.bytes_per_sample();
        Duration::from_secs_f64(samples as f64 / TELEPHONY_SAMPLE_RATE as f64)
    }

    /// Decode to linear PCM
    pub fn decode(&self) -> Result<PcmBuffer, CodecError> {
        codec::decode_to_linear(&self.payload, self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_conversions() {
        assert_eq!(SampleRate::Hz8000.as_u32(), 8000);
        assert_eq!(SampleRate::Hz8000.frame_size_20ms(), TELEPHONY_FRAME_BYTES);
        assert_eq!(SampleRate::Hz16000.frame_size_20ms(), 320);
        assert_eq!(SampleRate::from_u32(22050), Some(SampleRate::Hz22050));
        assert_eq!(SampleRate::from_u32(11025), None);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0; 160]), 0.0);

        let square: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { 1000 } else { -1000 }).collect();
        assert!((rms(&square) - 1000.0).abs() < 0.01);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::mulaw(vec![0xFF; TELEPHONY_FRAME_BYTES], 0);
        assert_eq!(frame.duration(), Duration::from_millis(20));

        let frame = AudioFrame::new(vec![0; 320], AudioEncoding::Pcm16, 1);
        assert_eq!(frame.duration(), Duration::from_millis(20));
    }

    #[test]
    fn test_frame_decode() {
        let frame = AudioFrame::mulaw(vec![0xFF; TELEPHONY_FRAME_BYTES], 0);
        let pcm = frame.decode().unwrap();
        assert_eq!(pcm.len(), TELEPHONY_FRAME_BYTES);
        assert_eq!(pcm.sample_rate, TELEPHONY_SAMPLE_RATE);
        assert_eq!(pcm.rms(), 0.0);
        assert_eq!(pcm.duration(), Duration::from_millis(20));
    }
}
