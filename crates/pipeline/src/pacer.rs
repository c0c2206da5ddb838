//! Real-time paced playback
//!
//! The transport plays whatever it receives immediately, so replies are sliced
//! into 20ms frames and released at playback speed. This keeps `clear` effective
//! and stops the transport buffer from growing unbounded.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use phone_agent_config::{constants::audio::MULAW_BYTES_PER_MS, Settings};

use crate::protocol::OutboundMessage;
use crate::PipelineError;

/// Destination for outbound stream messages
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Queue one message for the transport
    async fn send(&self, message: OutboundMessage) -> Result<(), PipelineError>;

    /// Whether the transport is still attached
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl MediaSink for mpsc::Sender<OutboundMessage> {
    async fn send(&self, message: OutboundMessage) -> Result<(), PipelineError> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    fn is_connected(&self) -> bool {
        !self.is_closed()
    }
}

/// Pacer configuration
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Bytes per media message (160 = 20ms at 8kHz)
    pub frame_bytes: usize,
    /// Send `clear` before the first frame
    pub clear_before_playback: bool,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            frame_bytes: phone_agent_config::constants::audio::FRAME_BYTES,
            clear_before_playback: true,
        }
    }
}

impl PacerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            frame_bytes: settings.pacer.frame_bytes.max(1),
            clear_before_playback: settings.pacer.clear_before_playback,
        }
    }
}

/// Outcome of one playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub frames_sent: usize,
    pub bytes_sent: usize,
    /// Audio never sent because the transport went away
    pub bytes_dropped: usize,
}

impl PlaybackReport {
    pub fn interrupted(&self) -> bool {
        self.bytes_dropped > 0
    }
}

/// Sends mu-law audio at real-time rate
#[derive(Debug, Clone, Default)]
pub struct OutboundPacer {
    config: PacerConfig,
}

impl OutboundPacer {
    pub fn new(config: PacerConfig) -> Self {
        Self { config }
    }

    /// Playback time of one chunk
    fn frame_duration(bytes: usize) -> Duration {
        Duration::from_micros((bytes * 1000 / MULAW_BYTES_PER_MS) as u64)
    }

    /// Play `audio` on `sink`, returning once the last frame's duration has elapsed
    pub async fn play(&self, sink: &dyn MediaSink, stream_sid: &str, audio: &[u8]) -> PlaybackReport {
        let mut report = PlaybackReport::default();

        if audio.is_empty() {
            return report;
        }

        if self.config.clear_before_playback
            && sink.send(OutboundMessage::clear(stream_sid)).await.is_err()
        {
            report.bytes_dropped = audio.len();
            tracing::debug!(stream_sid, "Transport gone before playback");
            return report;
        }

        for chunk in audio.chunks(self.config.frame_bytes) {
            if !sink.is_connected() {
                break;
            }
            if sink.send(OutboundMessage::media(stream_sid, chunk)).await.is_err() {
                break;
            }

            report.frames_sent += 1;
            report.bytes_sent += chunk.len();
            tokio::time::sleep(Self::frame_duration(chunk.len())).await;
        }

        report.bytes_dropped = audio.len() - report.bytes_sent;
        if report.interrupted() {
            tracing::info!(
                stream_sid,
                frames_sent = report.frames_sent,
                bytes_dropped = report.bytes_dropped,
                "Playback stopped early, transport disconnected"
            );
        } else {
            tracing::debug!(stream_sid, frames = report.frames_sent, "Playback complete");
        }

        report
    }
}
