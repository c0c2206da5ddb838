//! Telephony codec transcoder
//!
//! Conversions between G.711 mu-law (8kHz mono, the media stream wire format),
//! 16-bit linear PCM, and WAV containers for the speech services:
//!
//! ```text
//! inbound:  mu-law ─decode─▶ PCM16 @ 8kHz ─condition─▶ resample ─▶ WAV (STT rate)
//! outbound: WAV (any rate, any channels) ─downmix─▶ resample 8kHz ─▶ mu-law
//! ```
//!
//! Everything here is a pure function over byte buffers. Failures surface as
//! [`CodecError`]; callers skip the affected segment instead of tearing down the call.

use std::io::Cursor;

use thiserror::Error;

use crate::audio::{rms, AudioEncoding, PcmBuffer, TELEPHONY_SAMPLE_RATE};

/// mu-law encoder bias (G.711)
const MULAW_BIAS: i32 = 0x84;
/// Largest magnitude representable before bias is added
const MULAW_CLIP: i32 = 32635;

/// PCM16 <-> f32 scaling for the resampler
const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

/// Input chunk size for the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;
/// Inputs shorter than this use linear interpolation; the sinc filter delay
/// covers most of their output
const MIN_SINC_INPUT: usize = 512;

/// Codec failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Empty audio input")]
    Empty,

    #[error("Malformed audio: {0}")]
    Malformed(String),

    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("WAV container error: {0}")]
    Wav(#[from] hound::Error),
}

/// Compress one linear sample to mu-law
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let biased = magnitude.min(MULAW_CLIP) + MULAW_BIAS;
    // Highest set bit lies in 7..=14 for every biased magnitude
    let exponent = (31 - biased.leading_zeros() as i32 - 7).clamp(0, 7);
    let mantissa = (biased >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Expand one mu-law byte to a linear sample
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let code = !byte;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;

    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Expand narrow-band wire audio to 16-bit linear samples.
///
/// The transport is always 8kHz mono, so the returned buffer carries
/// [`TELEPHONY_SAMPLE_RATE`].
pub fn decode_to_linear(bytes: &[u8], source: AudioEncoding) -> Result<PcmBuffer, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }

    let samples = match source {
        AudioEncoding::Mulaw => bytes.iter().map(|&b| mulaw_to_linear(b)).collect(),
        AudioEncoding::Pcm16 => {
            if bytes.len() % 2 != 0 {
                return Err(CodecError::Malformed(format!(
                    "PCM16 payload has odd length {}",
                    bytes.len()
                )));
            }
            bytes
                .chunks_exact(2)
                .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
                .collect()
        },
    };

    Ok(PcmBuffer::new(samples, TELEPHONY_SAMPLE_RATE))
}

/// Compress linear samples to the transport format, resampling to 8kHz first
/// when needed.
pub fn encode_to_mulaw(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, CodecError> {
    let narrow = resample(samples, sample_rate, TELEPHONY_SAMPLE_RATE)?;
    Ok(narrow.into_iter().map(linear_to_mulaw).collect())
}

/// Linear-phase sample-rate conversion. Identity when the rates match.
///
/// Uses Rubato's FFT sinc resampler and falls back to linear interpolation for
/// very short inputs or if the resampler cannot be built.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>, CodecError> {
    if from_rate == 0 {
        return Err(CodecError::InvalidSampleRate(from_rate));
    }
    if to_rate == 0 {
        return Err(CodecError::InvalidSampleRate(to_rate));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    if samples.len() < MIN_SINC_INPUT {
        return Ok(resample_linear(samples, from_rate, to_rate));
    }

    match resample_sinc(samples, from_rate, to_rate) {
        Ok(resampled) => Ok(resampled),
        Err(e) => {
            tracing::warn!("Rubato resampling failed, using linear fallback: {}", e);
            Ok(resample_linear(samples, from_rate, to_rate))
        },
    }
}

fn expected_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    ((input_len as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize
}

fn resample_sinc(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>, String> {
    use rubato::{FftFixedIn, Resampler};

    let input: Vec<f32> = samples.iter().map(|&s| s as f32 / PCM16_NORMALIZE).collect();
    let chunk_size = input.len().min(RESAMPLE_CHUNK);

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1)
            .map_err(|e| e.to_string())?;

    let delay = resampler.output_delay();
    let wanted = expected_len(samples.len(), from_rate, to_rate);
    let mut output: Vec<f32> = Vec::with_capacity(wanted + delay);

    let mut position = 0;
    while input.len() - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk = &input[position..position + needed];
        let frames = resampler.process(&[chunk], None).map_err(|e| e.to_string())?;
        output.extend_from_slice(&frames[0]);
        position += needed;
    }

    if position < input.len() {
        let tail = &input[position..];
        let frames = resampler
            .process_partial(Some(&[tail][..]), None)
            .map_err(|e| e.to_string())?;
        output.extend_from_slice(&frames[0]);
    }

    // Flush the filter tail so the delayed output covers the whole input
    while output.len() < wanted + delay {
        let frames = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| e.to_string())?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    if output.len() < delay + wanted {
        return Err(format!(
            "filter produced {} frames, needed {} after a delay of {}",
            output.len(),
            wanted,
            delay
        ));
    }

    Ok(output
        .iter()
        .skip(delay)
        .take(wanted)
        .map(|&s| (s.clamp(-1.0, 1.0) * PCM16_SCALE) as i16)
        .collect())
}

/// Linear interpolation fallback for edge cases
fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = expected_len(samples.len(), from_rate, to_rate);
    let last = samples.len().saturating_sub(1);

    (0..new_len)
        .map(|i| {
            let src = i as f64 / ratio;
            let floor = (src.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let frac = src - floor as f64;
            let value = samples[floor] as f64 * (1.0 - frac) + samples[ceil] as f64 * frac;
            value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Wrap mono PCM16 in a WAV container
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, CodecError> {
    if sample_rate == 0 {
        return Err(CodecError::InvalidSampleRate(sample_rate));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Audio unpacked from a WAV container, down-mixed to mono
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    /// Mono PCM16 samples
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Channel count of the source container
    pub channels: u16,
}

/// Unpack a WAV container.
///
/// Integer (8/16/24/32-bit) and 32-bit float payloads are normalised to 16-bit.
/// Multi-channel input is down-mixed by averaging each interleaved frame.
pub fn decode_wav(bytes: &[u8]) -> Result<WavAudio, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }

    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(CodecError::Malformed("WAV header declares zero channels".to_string()));
    }
    if spec.sample_rate == 0 {
        return Err(CodecError::InvalidSampleRate(0));
    }

    let bits = spec.bits_per_sample;
    let interleaved: Vec<i16> = match (spec.sample_format, bits) {
        (hound::SampleFormat::Int, 1..=16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| ((v as i32) << (16 - bits)) as i16))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, 17..=32) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| (v >> (bits - 16)) as i16))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * PCM16_SCALE) as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(CodecError::Unsupported(format!(
                "{:?} samples at {} bits",
                format, bits
            )))
        },
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Pre-recognition clean-up applied to caller audio before it is sent to STT
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditioning {
    /// Segments with RMS below this are treated as quiet
    pub quiet_rms: f32,
    /// Gain applied to quiet segments (1.0 disables)
    pub quiet_gain: f32,
    /// Subtract the mean to remove DC offset
    pub remove_dc: bool,
}

impl Conditioning {
    /// Pass audio through untouched
    pub const NONE: Conditioning = Conditioning {
        quiet_rms: 0.0,
        quiet_gain: 1.0,
        remove_dc: false,
    };

    pub fn apply(&self, samples: &mut [i16]) {
        if samples.is_empty() {
            return;
        }

        if self.remove_dc {
            let mean = samples.iter().map(|&s| s as i64).sum::<i64>() / samples.len() as i64;
            if mean != 0 {
                for sample in samples.iter_mut() {
                    *sample = (*sample as i64 - mean).clamp(i16::MIN as i64, i16::MAX as i64) as i16;
                }
            }
        }

        if self.quiet_gain > 1.0 {
            let level = rms(samples);
            if level < self.quiet_rms {
                for sample in samples.iter_mut() {
                    let boosted = *sample as f32 * self.quiet_gain;
                    *sample = boosted.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
                tracing::debug!(rms = level, gain = self.quiet_gain, "Amplified quiet segment");
            }
        }
    }
}

impl Default for Conditioning {
    fn default() -> Self {
        Self {
            quiet_rms: 500.0,
            quiet_gain: 2.0,
            remove_dc: true,
        }
    }
}

/// Prepare a mu-law speech segment for the speech-to-text service
pub fn mulaw_to_wav(
    mulaw: &[u8],
    target_rate: u32,
    conditioning: &Conditioning,
) -> Result<Vec<u8>, CodecError> {
    let mut pcm = decode_to_linear(mulaw, AudioEncoding::Mulaw)?;
    conditioning.apply(&mut pcm.samples);
    let resampled = resample(&pcm.samples, pcm.sample_rate, target_rate)?;
    encode_wav(&resampled, target_rate)
}

/// Convert synthesized speech to raw transport frames (8kHz mono mu-law, no header)
pub fn wav_to_mulaw(wav: &[u8]) -> Result<Vec<u8>, CodecError> {
    let audio = decode_wav(wav)?;
    if audio.samples.is_empty() {
        return Err(CodecError::Empty);
    }
    if audio.channels > 1 {
        tracing::debug!(channels = audio.channels, "Down-mixed synthesized audio to mono");
    }
    encode_to_mulaw(&audio.samples, audio.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: f32, rate: u32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_mulaw_reference_points() {
        assert_eq!(mulaw_to_linear(0xFF), 0);
        assert_eq!(mulaw_to_linear(0x80), 32124);
        assert_eq!(mulaw_to_linear(0x00), -32124);
        assert_eq!(linear_to_mulaw(0), 0xFF);
        assert_eq!(linear_to_mulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_mulaw(i16::MIN), 0x00);
    }

    #[test]
    fn test_mulaw_round_trip_is_bit_exact() {
        for byte in 0..=255u8 {
            let linear = mulaw_to_linear(byte);
            let back = linear_to_mulaw(linear);
            if byte == 0x7F {
                // Negative zero canonicalises to positive zero
                assert_eq!(back, 0xFF);
            } else {
                assert_eq!(back, byte, "byte {:#04x} -> {} -> {:#04x}", byte, linear, back);
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode_to_linear(&[], AudioEncoding::Mulaw),
            Err(CodecError::Empty)
        ));
        assert!(matches!(
            decode_to_linear(&[1, 2, 3], AudioEncoding::Pcm16),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_resample_identity_and_lengths() {
        let samples = tone(1600, 8000.0, 8000);
        assert_eq!(resample(&samples, 8000, 8000).unwrap(), samples);

        let up = resample(&samples, 8000, 16000).unwrap();
        assert_eq!(up.len(), 3200);

        let down = resample(&up, 16000, 8000).unwrap();
        assert_eq!(down.len(), 1600);

        // Short input takes the linear path
        let short = resample(&[100, 200, 300, 400], 8000, 16000).unwrap();
        assert_eq!(short.len(), 8);

        assert!(matches!(
            resample(&samples, 0, 8000),
            Err(CodecError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_resample_preserves_level() {
        let samples = tone(8000, 10000.0, 8000);
        let up = resample(&samples, 8000, 16000).unwrap();
        let ratio = rms(&up) / rms(&samples);
        assert!((0.8..1.2).contains(&ratio), "level ratio {}", ratio);
    }

    #[test]
    fn test_short_downsample_keeps_level() {
        for from_rate in [11025, 22050, 44100] {
            for len in (64..=640).step_by(16) {
                let samples = tone(len, 8000.0, from_rate);
                let narrow = resample(&samples, from_rate, 8000).unwrap();
                assert_eq!(narrow.len(), expected_len(len, from_rate, 8000));

                let ratio = rms(&narrow) / rms(&samples);
                assert!(
                    (0.5..1.5).contains(&ratio),
                    "{} samples at {}Hz: level ratio {}",
                    len,
                    from_rate,
                    ratio
                );
            }
        }
    }

    #[test]
    fn test_wav_round_trip() {
        let samples = tone(800, 12000.0, 16000);
        let wav = encode_wav(&samples, 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");

        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn test_decode_wav_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..10 {
                writer.write_sample(1000i16).unwrap();
                writer.write_sample(3000i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples, vec![2000; 10]);
    }

    #[test]
    fn test_decode_wav_garbage() {
        assert!(decode_wav(b"definitely not a wav file").is_err());
        assert!(matches!(decode_wav(&[]), Err(CodecError::Empty)));
    }

    #[test]
    fn test_wav_to_mulaw_resamples_to_telephony() {
        // 1 second at 16kHz -> 8000 mu-law bytes
        let wav = encode_wav(&tone(16000, 9000.0, 16000), 16000).unwrap();
        let mulaw = wav_to_mulaw(&wav).unwrap();
        assert_eq!(mulaw.len(), 8000);

        let back = decode_to_linear(&mulaw, AudioEncoding::Mulaw).unwrap();
        assert!(back.rms() > 4000.0);
    }

    #[test]
    fn test_pcm_to_mulaw_preserves_duration() {
        let samples = tone(1600, 5000.0, 8000);
        let mulaw = encode_to_mulaw(&samples, 8000).unwrap();
        assert_eq!(mulaw.len(), samples.len());

        let decoded = decode_to_linear(&mulaw, AudioEncoding::Mulaw).unwrap();
        assert_eq!(decoded.duration(), std::time::Duration::from_millis(200));
    }

    #[test]
    fn test_mulaw_to_wav_for_recognition() {
        let mulaw: Vec<u8> = tone(800, 6000.0, 8000).into_iter().map(linear_to_mulaw).collect();
        let wav = mulaw_to_wav(&mulaw, 16000, &Conditioning::default()).unwrap();

        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), 1600);
    }

    #[test]
    fn test_conditioning_boosts_quiet_audio() {
        let mut quiet = vec![100i16, -100, 100, -100];
        Conditioning::default().apply(&mut quiet);
        assert_eq!(quiet, vec![200, -200, 200, -200]);

        let mut loud = vec![4000i16, -4000];
        Conditioning::default().apply(&mut loud);
        assert_eq!(loud, vec![4000, -4000]);

        let mut offset = vec![1100i16, 900, 1100, 900];
        Conditioning {
            quiet_gain: 1.0,
            ..Conditioning::default()
        }
        .apply(&mut offset);
        assert_eq!(offset, vec![100, -100, 100, -100]);
    }
}
