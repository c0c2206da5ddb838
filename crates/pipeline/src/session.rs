//! Call session
//!
//! One `CallSession` owns all per-call state and runs a single sequential loop
//! over inbound stream events. Frames are classified and segmented in arrival
//! order; a completed segment is handed to a spawned turn task which takes the
//! conversation context and failure tracker with it and returns them when done.
//! While that task runs the segmenter stays locked and incoming frames are
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use phone_agent_config::Settings;
use phone_agent_core::{AudioFrame, ConversationContext, Error, Language};

use crate::orchestrator::{CallInfo, PipelineEvent, RecognitionTracker, TurnOrchestrator, TurnOutcome};
use crate::pacer::MediaSink;
use crate::protocol::{InboundEvent, StartPayload};
use crate::segmenter::{SegmentEvent, Segmenter, SegmenterConfig, SpeechSegment};
use crate::vad::{AdaptiveVad, VadConfig};

/// Per-call configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub vad: VadConfig,
    pub segmenter: SegmenterConfig,
    pub system_prompt: String,
    /// Non-system turns kept in context
    pub max_turns: usize,
    /// Used when the stream does not name a supported language
    pub default_language: Language,
    pub max_recognition_failures: u32,
    /// Session ends after this long without inbound media
    pub inactivity_timeout: Duration,
    /// Spoken when recognition keeps failing
    pub handoff_message: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        use phone_agent_config::constants::{conversation, timeouts};

        Self {
            vad: VadConfig::default(),
            segmenter: SegmenterConfig::default(),
            system_prompt: conversation::SYSTEM_PROMPT.to_string(),
            max_turns: conversation::MAX_TURNS,
            default_language: Language::default(),
            max_recognition_failures: conversation::MAX_RECOGNITION_FAILURES,
            inactivity_timeout: Duration::from_secs(timeouts::INACTIVITY_SECS),
            handoff_message: None,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let conversation = &settings.conversation;
        Self {
            vad: VadConfig::from_settings(settings),
            segmenter: SegmenterConfig::from_settings(settings),
            system_prompt: conversation.system_prompt.clone(),
            max_turns: conversation.max_turns,
            default_language: settings.default_language(),
            max_recognition_failures: conversation.max_recognition_failures,
            inactivity_timeout: Duration::from_secs(conversation.inactivity_timeout_secs),
            handoff_message: conversation.handoff_message.clone(),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The transport sent `stop`
    Stopped,
    /// The inbound stream closed without `stop`
    Disconnected,
    /// No inbound media within the inactivity window
    TimedOut(Duration),
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::Stopped => "stopped",
            SessionEnd::Disconnected => "disconnected",
            SessionEnd::TimedOut(_) => "timeout",
        }
    }

    /// Abnormal endings as errors
    pub fn into_error(self) -> Option<Error> {
        match self {
            SessionEnd::Stopped => None,
            SessionEnd::Disconnected => Some(Error::TransportDisconnected),
            SessionEnd::TimedOut(after) => Some(Error::SessionTimeout(after)),
        }
    }
}

/// Per-call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    /// Media that arrived before `start`
    pub frames_dropped_before_start: u64,
    /// Media that failed to decode
    pub frames_invalid: u64,
    pub segments_dispatched: u64,
    pub segments_too_short: u64,
    /// Frames dropped while a turn was in flight
    pub frames_discarded: u64,
    pub overflows: u64,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub turns_unrecognized: u64,
    pub escalations: u64,
}

/// Summary returned when the session ends
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub stream_sid: Option<String>,
    pub language: Option<Language>,
    pub stats: SessionStats,
    pub ended_by: SessionEnd,
    /// Turns left in context at the end of the call, system prompt included
    pub context_len: usize,
}

/// What the turn task hands back
struct TurnResult {
    context: ConversationContext,
    tracker: RecognitionTracker,
    outcome: Result<TurnOutcome, Error>,
}

/// State and loop for one phone call
pub struct CallSession {
    config: SessionConfig,
    orchestrator: Arc<TurnOrchestrator>,
    vad: AdaptiveVad,
    segmenter: Segmenter,
    /// `None` while a turn task holds it
    context: Option<ConversationContext>,
    tracker: Option<RecognitionTracker>,
    call: Option<CallInfo>,
    stats: SessionStats,
    frame_sequence: u64,
}

impl CallSession {
    pub fn new(config: SessionConfig, orchestrator: Arc<TurnOrchestrator>) -> Self {
        Self {
            vad: AdaptiveVad::new(config.vad.clone()),
            segmenter: Segmenter::new(config.segmenter.clone()),
            context: Some(ConversationContext::new(config.system_prompt.clone(), config.max_turns)),
            tracker: Some(RecognitionTracker::new(config.max_recognition_failures)),
            call: None,
            stats: SessionStats::default(),
            frame_sequence: 0,
            config,
            orchestrator,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run until `stop`, disconnect or inactivity timeout.
    ///
    /// A turn still in flight at that point is awaited before returning.
    pub async fn run<St>(mut self, mut inbound: St, sink: Arc<dyn MediaSink>) -> SessionReport
    where
        St: Stream<Item = InboundEvent> + Unpin + Send,
    {
        let inactivity = self.config.inactivity_timeout;
        let mut deadline = Instant::now() + inactivity;
        let mut turn: Option<JoinHandle<TurnResult>> = None;

        let ended_by = loop {
            tokio::select! {
                // A finished turn unlocks the segmenter before more frames are read
                biased;

                result = join_turn(&mut turn), if turn.is_some() => {
                    turn = None;
                    self.finish_turn(result);
                }

                next = tokio::time::timeout_at(deadline, inbound.next()) => {
                    let event = match next {
                        Err(_) => {
                            tracing::warn!(
                                stream_sid = self.stream_sid().unwrap_or("-"),
                                timeout_secs = inactivity.as_secs(),
                                "No media received, ending session"
                            );
                            break SessionEnd::TimedOut(inactivity);
                        },
                        Ok(None) => break SessionEnd::Disconnected,
                        Ok(Some(event)) => event,
                    };

                    match event {
                        InboundEvent::Media { media } => {
                            deadline = Instant::now() + inactivity;
                            match media.decode() {
                                Ok(payload) => {
                                    if let Some(segment) = self.on_media(payload) {
                                        turn = Some(self.dispatch(segment, &sink));
                                    }
                                },
                                Err(e) => {
                                    self.stats.frames_invalid += 1;
                                    tracing::warn!(error = %e, "Skipping undecodable media payload");
                                },
                            }
                        },
                        InboundEvent::Start { start } => self.on_start(start),
                        InboundEvent::Stop { .. } => {
                            tracing::info!(stream_sid = self.stream_sid().unwrap_or("-"), "Stream stopped");
                            break SessionEnd::Stopped;
                        },
                        other => {
                            tracing::debug!(event = other.name(), "Ignoring stream event");
                        },
                    }
                }
            }
        };

        if let Some(handle) = turn.take() {
            tracing::debug!("Waiting for in-flight turn before teardown");
            let result = handle.await;
            self.finish_turn(result);
        }

        self.stats.frames_discarded = self.segmenter.stats().frames_discarded;

        let stream_sid = self.call.as_ref().map(|c| c.stream_sid.clone());
        tracing::info!(
            stream_sid = stream_sid.as_deref().unwrap_or("-"),
            reason = ended_by.as_str(),
            frames = self.stats.frames_received,
            turns = self.stats.turns_completed,
            failed = self.stats.turns_failed,
            escalations = self.stats.escalations,
            "Session ended"
        );
        self.orchestrator.emit(PipelineEvent::SessionEnded {
            stream_sid: stream_sid.clone(),
            reason: ended_by.as_str().to_string(),
        });

        SessionReport {
            stream_sid,
            language: self.call.as_ref().map(|c| c.language),
            stats: self.stats,
            ended_by,
            context_len: self.context.as_ref().map(|c| c.len()).unwrap_or_default(),
        }
    }

    fn stream_sid(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.stream_sid.as_str())
    }

    fn on_start(&mut self, start: StartPayload) {
        let language = match start.language() {
            Some(tag) => Language::from_tag(tag).unwrap_or_else(|| {
                tracing::warn!(
                    requested = tag,
                    fallback = %self.config.default_language,
                    "Unsupported call language, using default"
                );
                self.config.default_language
            }),
            None => self.config.default_language,
        };

        if let Some(previous) = &self.call {
            tracing::warn!(
                previous = %previous.stream_sid,
                stream_sid = %start.stream_sid,
                "Duplicate start event, replacing stream metadata"
            );
        }

        tracing::info!(
            stream_sid = %start.stream_sid,
            call_sid = start.call_sid.as_deref().unwrap_or("-"),
            language = %language,
            "Stream started"
        );
        self.orchestrator.emit(PipelineEvent::SessionStarted {
            stream_sid: start.stream_sid.clone(),
            language,
        });
        self.call = Some(CallInfo {
            stream_sid: start.stream_sid,
            language,
        });
    }

    /// Classify and segment one frame. Returns a segment ready for a turn.
    fn on_media(&mut self, payload: Vec<u8>) -> Option<SpeechSegment> {
        if self.call.is_none() {
            self.stats.frames_dropped_before_start += 1;
            tracing::debug!(bytes = payload.len(), "Media before start, dropping");
            return None;
        }

        self.stats.frames_received += 1;
        self.frame_sequence += 1;

        if self.segmenter.is_locked() {
            self.segmenter.push(&payload, false);
            return None;
        }

        let frame = AudioFrame::mulaw(payload, self.frame_sequence);
        let decision = match self.vad.classify(&frame, self.segmenter.is_speaking()) {
            Ok(decision) => decision,
            Err(e) => {
                self.stats.frames_invalid += 1;
                tracing::warn!(sequence = frame.sequence, error = %e, "Skipping frame");
                return None;
            },
        };

        match self.segmenter.push(&frame.payload, decision.is_speech) {
            SegmentEvent::Ready(segment) => {
                self.stats.segments_dispatched += 1;
                tracing::debug!(
                    sequence = segment.sequence,
                    bytes = segment.len(),
                    truncated = segment.truncated,
                    "Segment ready"
                );
                self.orchestrator.emit(PipelineEvent::SegmentReady {
                    bytes: segment.len(),
                    truncated: segment.truncated,
                });
                Some(segment)
            },
            SegmentEvent::TooShort { bytes } => {
                self.stats.segments_too_short += 1;
                self.orchestrator.emit(PipelineEvent::SegmentTooShort { bytes });
                None
            },
            SegmentEvent::Overflow { bytes } => {
                self.stats.overflows += 1;
                self.orchestrator.emit(PipelineEvent::SegmentOverflow { bytes });
                None
            },
            SegmentEvent::Ignored | SegmentEvent::Buffering | SegmentEvent::Discarded => None,
        }
    }

    /// Spawn the turn task for a completed segment
    fn dispatch(&mut self, segment: SpeechSegment, sink: &Arc<dyn MediaSink>) -> JoinHandle<TurnResult> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let sink = Arc::clone(sink);
        let handoff = self.config.handoff_message.clone();
        // Only reachable after start
        let call = self.call.clone().unwrap_or_else(|| CallInfo {
            stream_sid: String::new(),
            language: self.config.default_language,
        });
        let mut context = self
            .context
            .take()
            .unwrap_or_else(|| ConversationContext::new(self.config.system_prompt.clone(), self.config.max_turns));
        let mut tracker = self
            .tracker
            .take()
            .unwrap_or_else(|| RecognitionTracker::new(self.config.max_recognition_failures));

        tokio::spawn(async move {
            let outcome = orchestrator
                .process_turn(&segment, &call, &mut context, &mut tracker, sink.as_ref())
                .await;

            if let (Ok(TurnOutcome::Unrecognized { escalate: true, .. }), Some(message)) = (&outcome, &handoff) {
                if let Err(e) = orchestrator.speak(message, &call, sink.as_ref()).await {
                    tracing::warn!(error = %e, "Hand-off message could not be played");
                }
            }

            TurnResult {
                context,
                tracker,
                outcome,
            }
        })
    }

    fn finish_turn(&mut self, result: Result<TurnResult, JoinError>) {
        match result {
            Ok(TurnResult {
                context,
                tracker,
                outcome,
            }) => {
                self.context = Some(context);
                self.tracker = Some(tracker);

                match outcome {
                    Ok(TurnOutcome::Completed { .. }) => self.stats.turns_completed += 1,
                    Ok(TurnOutcome::Unrecognized { escalate, .. }) => {
                        self.stats.turns_unrecognized += 1;
                        if escalate {
                            self.stats.escalations += 1;
                        }
                    },
                    Err(_) => self.stats.turns_failed += 1,
                }
            },
            Err(e) => {
                // The task panicked; start over with a fresh context
                tracing::error!(error = %e, "Turn task aborted");
                self.stats.turns_failed += 1;
                self.context = Some(ConversationContext::new(
                    self.config.system_prompt.clone(),
                    self.config.max_turns,
                ));
                self.tracker = Some(RecognitionTracker::new(self.config.max_recognition_failures));
            },
        }

        self.segmenter.release();
    }
}

async fn join_turn(turn: &mut Option<JoinHandle<TurnResult>>) -> Result<TurnResult, JoinError> {
    match turn {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use phone_agent_core::{LanguageModel, Recognition, SpeechToText, TextToSpeech, Turn};

    #[test]
    fn test_session_end_errors() {
        assert!(SessionEnd::Stopped.into_error().is_none());
        assert!(matches!(
            SessionEnd::Disconnected.into_error(),
            Some(Error::TransportDisconnected)
        ));
        let err = SessionEnd::TimedOut(Duration::from_secs(300)).into_error().unwrap();
        assert!(err.is_fatal());
        assert_eq!(SessionEnd::TimedOut(Duration::ZERO).as_str(), "timeout");
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.default_language, Language::Telugu);
        assert_eq!(config.inactivity_timeout, Duration::from_secs(300));
        assert_eq!(config.max_recognition_failures, 3);
        assert_eq!(config.segmenter.min_speech_bytes, 4800);
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.conversation.default_language = "hi-IN".to_string();
        settings.conversation.handoff_message = Some("Connecting you to a person".to_string());
        settings.segmenter.silence_ms = 400;

        let config = SessionConfig::from_settings(&settings);
        assert_eq!(config.default_language, Language::Hindi);
        assert_eq!(config.segmenter.silence_bytes, 3200);
        assert!(config.handoff_message.is_some());
    }

    struct Unused;

    #[async_trait::async_trait]
    impl SpeechToText for Unused {
        async fn recognize(&self, _wav: &[u8], language: Language) -> phone_agent_core::Result<Recognition> {
            Ok(Recognition::new("", language))
        }

        fn model_name(&self) -> &str {
            "unused"
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for Unused {
        async fn respond(&self, _turns: &[Turn]) -> phone_agent_core::Result<String> {
            Ok(String::new())
        }

        fn model_name(&self) -> &str {
            "unused"
        }
    }

    #[async_trait::async_trait]
    impl TextToSpeech for Unused {
        async fn synthesize(&self, _text: &str, _language: Language) -> phone_agent_core::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn model_name(&self) -> &str {
            "unused"
        }
    }

    fn started_session() -> CallSession {
        let orchestrator = TurnOrchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
        );
        let mut session = CallSession::new(SessionConfig::default(), Arc::new(orchestrator));
        session.on_start(StartPayload {
            stream_sid: "MZ1".to_string(),
            call_sid: None,
            account_sid: None,
            tracks: Vec::new(),
            custom_parameters: Default::default(),
        });
        session
    }

    #[test]
    fn test_noise_floor_holds_while_turn_locked() {
        let mut session = started_session();
        let loud = vec![0x10u8; 160];
        let quiet = vec![0xFFu8; 160];

        for _ in 0..100 {
            assert!(session.on_media(loud.clone()).is_none());
        }
        let mut segment = None;
        for _ in 0..10 {
            segment = segment.or(session.on_media(quiet.clone()));
        }
        assert!(segment.is_some());
        assert!(session.segmenter.is_locked());

        let locked_at = session.vad.thresholds();
        let updates = session.vad.floor_updates();
        let classified = session.vad.frames();

        // Room noise during playback never reaches the VAD
        for _ in 0..50 {
            assert!(session.on_media(quiet.clone()).is_none());
        }
        assert_eq!(session.vad.thresholds(), locked_at);
        assert_eq!(session.vad.floor_updates(), updates);
        assert_eq!(session.vad.frames(), classified);
        assert_eq!(session.segmenter.stats().frames_discarded, 50);

        // Adaptation resumes once the turn is released
        session.segmenter.release();
        session.on_media(quiet.clone());
        assert_eq!(session.vad.floor_updates(), updates + 1);
        assert!(session.vad.thresholds().noise_floor < locked_at.noise_floor);
    }
}
