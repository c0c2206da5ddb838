//! Turn orchestrator
//!
//! Drives one completed speech segment through the call's services:
//!
//! ```text
//! mu-law segment ─▶ WAV ─▶ STT ─▶ context ─▶ LLM ─▶ context ─▶ TTS ─▶ mu-law ─▶ pacer
//! ```
//!
//! A failure at any stage aborts that turn only. The orchestrator never retries;
//! the session releases the segmenter and keeps listening.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use phone_agent_config::Settings;
use phone_agent_core::{
    codec, Conditioning, ConversationContext, Error, Language, LanguageModel, SpeechToText,
    TextToSpeech,
};

use crate::pacer::{MediaSink, OutboundPacer, PacerConfig, PlaybackReport};
use crate::segmenter::SpeechSegment;

/// Pipeline events, broadcast to observers (metrics, logs, tests)
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Stream metadata received
    SessionStarted { stream_sid: String, language: Language },
    /// Utterance handed to the orchestrator
    SegmentReady { bytes: usize, truncated: bool },
    /// Utterance dropped below the minimum length
    SegmentTooShort { bytes: usize },
    /// Buffered audio dropped at the hard cap
    SegmentOverflow { bytes: usize },
    /// Usable transcript
    Transcript { text: String, language: Language },
    /// Transcript empty or too short
    RecognitionFailed { consecutive_failures: u32 },
    /// Failure streak reached the configured threshold
    EscalationRequested { consecutive_failures: u32 },
    /// Reply text produced
    Response { text: String },
    /// Reply played back
    TurnCompleted { latency: TurnLatency, playback: PlaybackReport },
    /// Turn aborted
    TurnFailed { stage: TurnStage, error: String },
    /// Session torn down
    SessionEnded { stream_sid: Option<String>, reason: String },
}

/// Stages of a turn, for failure attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Transcode,
    Recognition,
    Reasoning,
    Synthesis,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Transcode => "transcode",
            TurnStage::Recognition => "recognition",
            TurnStage::Reasoning => "reasoning",
            TurnStage::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-turn stage latencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnLatency {
    pub stt: Duration,
    pub llm: Duration,
    pub tts: Duration,
    /// Segment completion to first outbound frame
    pub total: Duration,
}

/// Consecutive recognition failure counter
#[derive(Debug, Clone)]
pub struct RecognitionTracker {
    threshold: u32,
    consecutive: u32,
}

impl RecognitionTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Count a failure. Returns true exactly once per streak, when it reaches the threshold.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == self.threshold
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Identity of the call a turn belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub stream_sid: String,
    /// Pinned for the call; replies are always synthesized in it
    pub language: Language,
}

/// How a turn ended without error
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reply spoken to the caller
    Completed {
        transcript: String,
        reply: String,
        latency: TurnLatency,
        playback: PlaybackReport,
    },
    /// Nothing usable was recognized
    Unrecognized {
        consecutive_failures: u32,
        /// Failure streak just reached the threshold
        escalate: bool,
    },
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// WAV rate sent to speech-to-text
    pub stt_sample_rate: u32,
    pub conditioning: Conditioning,
    /// Shorter transcripts (non-whitespace chars) count as recognition failures
    pub min_transcript_chars: usize,
    pub pacer: PacerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        use phone_agent_config::constants::{audio, conversation};

        Self {
            stt_sample_rate: audio::STT_SAMPLE_RATE,
            conditioning: Conditioning::default(),
            min_transcript_chars: conversation::MIN_TRANSCRIPT_CHARS,
            pacer: PacerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            stt_sample_rate: settings.audio.stt_sample_rate,
            conditioning: Conditioning {
                quiet_rms: settings.audio.quiet_rms,
                quiet_gain: settings.audio.quiet_gain,
                remove_dc: settings.audio.remove_dc,
            },
            min_transcript_chars: settings.conversation.min_transcript_chars,
            pacer: PacerConfig::from_settings(settings),
        }
    }
}

/// Runs STT → LLM → TTS for one segment at a time
pub struct TurnOrchestrator {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
    pacer: OutboundPacer,
    config: OrchestratorConfig,
    events: broadcast::Sender<PipelineEvent>,
}

impl TurnOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self::with_events(config, stt, llm, tts, events)
    }

    /// Share an existing event channel
    pub fn with_events(
        config: OrchestratorConfig,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            stt,
            llm,
            tts,
            pacer: OutboundPacer::new(config.pacer.clone()),
            config,
            events,
        }
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Process one completed segment
    pub async fn process_turn(
        &self,
        segment: &SpeechSegment,
        call: &CallInfo,
        context: &mut ConversationContext,
        tracker: &mut RecognitionTracker,
        sink: &dyn MediaSink,
    ) -> Result<TurnOutcome, Error> {
        let started = Instant::now();
        let mut latency = TurnLatency::default();

        let wav = codec::mulaw_to_wav(&segment.audio, self.config.stt_sample_rate, &self.config.conditioning)
            .map_err(|e| self.fail(call, TurnStage::Transcode, e.into()))?;

        let stt_start = Instant::now();
        let recognition = self
            .stt
            .recognize(&wav, call.language)
            .await
            .map_err(|e| self.fail(call, TurnStage::Recognition, e))?;
        latency.stt = stt_start.elapsed();

        let transcript = match recognition.transcript(self.config.min_transcript_chars) {
            Ok(text) => text.to_string(),
            Err(e) => {
                let escalate = tracker.record_failure();
                let consecutive_failures = tracker.consecutive_failures();

                tracing::info!(
                    stream_sid = %call.stream_sid,
                    consecutive_failures,
                    kind = e.kind(),
                    stt_ms = latency.stt.as_millis() as u64,
                    "{}",
                    e
                );
                self.emit(PipelineEvent::RecognitionFailed { consecutive_failures });

                if escalate {
                    tracing::warn!(
                        stream_sid = %call.stream_sid,
                        consecutive_failures,
                        "Recognition keeps failing, requesting escalation"
                    );
                    self.emit(PipelineEvent::EscalationRequested { consecutive_failures });
                }

                return Ok(TurnOutcome::Unrecognized {
                    consecutive_failures,
                    escalate,
                });
            },
        };

        tracker.record_success();
        tracing::info!(
            stream_sid = %call.stream_sid,
            language = %recognition.language,
            stt_ms = latency.stt.as_millis() as u64,
            "Caller: {}",
            transcript
        );
        self.emit(PipelineEvent::Transcript {
            text: transcript.clone(),
            language: recognition.language,
        });

        context.push_user(transcript.clone());

        let llm_start = Instant::now();
        let reply = match self.llm.respond(context.turns()).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                context.pop_last_user();
                let err = Error::collaborator("llm", "empty reply");
                return Err(self.fail(call, TurnStage::Reasoning, err));
            },
            Err(e) => {
                context.pop_last_user();
                return Err(self.fail(call, TurnStage::Reasoning, e));
            },
        };
        latency.llm = llm_start.elapsed();

        context.push_assistant(reply.clone());
        context.truncate();

        tracing::info!(
            stream_sid = %call.stream_sid,
            llm_ms = latency.llm.as_millis() as u64,
            history = context.history_len(),
            "Agent: {}",
            reply
        );
        self.emit(PipelineEvent::Response { text: reply.clone() });

        let tts_start = Instant::now();
        let audio = self
            .synthesize(&reply, call.language)
            .await
            .map_err(|e| self.fail(call, TurnStage::Synthesis, e))?;
        latency.tts = tts_start.elapsed();
        latency.total = started.elapsed();

        let playback = self.pacer.play(sink, &call.stream_sid, &audio).await;

        tracing::info!(
            stream_sid = %call.stream_sid,
            stt_ms = latency.stt.as_millis() as u64,
            llm_ms = latency.llm.as_millis() as u64,
            tts_ms = latency.tts.as_millis() as u64,
            total_ms = latency.total.as_millis() as u64,
            frames = playback.frames_sent,
            "Turn complete"
        );
        self.emit(PipelineEvent::TurnCompleted { latency, playback });

        Ok(TurnOutcome::Completed {
            transcript,
            reply,
            latency,
            playback,
        })
    }

    /// Synthesize and play a fixed message, such as the escalation hand-off
    pub async fn speak(&self, text: &str, call: &CallInfo, sink: &dyn MediaSink) -> Result<PlaybackReport, Error> {
        let audio = self
            .synthesize(text, call.language)
            .await
            .map_err(|e| self.fail(call, TurnStage::Synthesis, e))?;
        Ok(self.pacer.play(sink, &call.stream_sid, &audio).await)
    }

    /// TTS then transcode to wire mu-law
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, Error> {
        let wav = self.tts.synthesize(text, language).await?;
        if wav.is_empty() {
            return Err(Error::collaborator("tts", "empty audio"));
        }

        let audio = codec::wav_to_mulaw(&wav)?;
        if audio.is_empty() {
            return Err(Error::collaborator("tts", "synthesized audio decoded to nothing"));
        }
        Ok(audio)
    }

    fn fail(&self, call: &CallInfo, stage: TurnStage, error: Error) -> Error {
        tracing::warn!(
            stream_sid = %call.stream_sid,
            stage = %stage,
            error = %error,
            "Turn aborted"
        );
        self.emit(PipelineEvent::TurnFailed {
            stage,
            error: error.to_string(),
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use phone_agent_core::{Recognition, Turn, TurnRole};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::protocol::OutboundMessage;

    struct ScriptedStt {
        transcripts: Mutex<VecDeque<Result<String, Error>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStt {
        fn new(transcripts: Vec<Result<String, Error>>) -> Arc<Self> {
            Arc::new(Self {
                transcripts: Mutex::new(transcripts.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn recognize(&self, wav: &[u8], language: Language) -> phone_agent_core::Result<Recognition> {
            assert_eq!(&wav[0..4], b"RIFF");
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.transcripts.lock().unwrap().pop_front().unwrap_or(Ok(String::new()));
            next.map(|text| Recognition::new(text, language))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct EchoLlm {
        fail: bool,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl LanguageModel for EchoLlm {
        async fn respond(&self, turns: &[Turn]) -> phone_agent_core::Result<String> {
            self.seen.lock().unwrap().push(turns.to_vec());
            if self.fail {
                return Err(Error::collaborator("llm", "HTTP 500"));
            }
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("You said {}", last))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct ToneTts {
        languages: Mutex<Vec<Language>>,
        empty: bool,
    }

    #[async_trait]
    impl TextToSpeech for ToneTts {
        async fn synthesize(&self, _text: &str, language: Language) -> phone_agent_core::Result<Vec<u8>> {
            self.languages.lock().unwrap().push(language);
            if self.empty {
                return Ok(Vec::new());
            }
            // 200ms at 8kHz
            Ok(codec::encode_wav(&vec![3000i16; 1600], 8000)?)
        }

        fn model_name(&self) -> &str {
            "tone"
        }
    }

    fn llm(fail: bool) -> Arc<EchoLlm> {
        Arc::new(EchoLlm {
            fail,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn tts(empty: bool) -> Arc<ToneTts> {
        Arc::new(ToneTts {
            languages: Mutex::new(Vec::new()),
            empty,
        })
    }

    fn segment() -> SpeechSegment {
        SpeechSegment {
            audio: vec![0x20; 8000],
            sequence: 1,
            truncated: false,
        }
    }

    fn call() -> CallInfo {
        CallInfo {
            stream_sid: "MZtest".to_string(),
            language: Language::Hindi,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_turn() {
        let stt = ScriptedStt::new(vec![Ok("namaste ji".to_string())]);
        let tts = tts(false);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt.clone(), llm(false), tts.clone());
        let mut events = orchestrator.subscribe();

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        let outcome = orchestrator
            .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Completed {
                transcript,
                reply,
                playback,
                ..
            } => {
                assert_eq!(transcript, "namaste ji");
                assert_eq!(reply, "You said namaste ji");
                assert_eq!(playback.frames_sent, 10);
            },
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(context.history_len(), 2);
        assert_eq!(context.turns()[2].role, TurnRole::Assistant);
        assert_eq!(*tts.languages.lock().unwrap(), vec![Language::Hindi]);

        assert_eq!(rx.recv().await, Some(OutboundMessage::clear("MZtest")));
        let mut frames = 0;
        while let Ok(OutboundMessage::Media { .. }) = rx.try_recv() {
            frames += 1;
        }
        assert_eq!(frames, 10);

        assert!(matches!(events.try_recv(), Ok(PipelineEvent::Transcript { .. })));
        assert!(matches!(events.try_recv(), Ok(PipelineEvent::Response { .. })));
        assert!(matches!(events.try_recv(), Ok(PipelineEvent::TurnCompleted { .. })));
    }

    #[tokio::test]
    async fn test_escalates_once_per_streak() {
        let stt = ScriptedStt::new(vec![
            Ok(String::new()),
            Ok(" a ".to_string()),
            Ok("  ".to_string()),
            Ok(String::new()),
        ]);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt.clone(), llm(false), tts(false));
        let mut events = orchestrator.subscribe();

        let (tx, _rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        let mut escalations = 0;
        for expected in 1..=4u32 {
            let outcome = orchestrator
                .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
                .await
                .unwrap();
            match outcome {
                TurnOutcome::Unrecognized {
                    consecutive_failures,
                    escalate,
                } => {
                    assert_eq!(consecutive_failures, expected);
                    assert_eq!(escalate, expected == 3);
                    if escalate {
                        escalations += 1;
                    }
                },
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(escalations, 1);
        assert_eq!(context.history_len(), 0);

        let mut requested = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PipelineEvent::EscalationRequested { .. }) {
                requested += 1;
            }
        }
        assert_eq!(requested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_streak() {
        let stt = ScriptedStt::new(vec![
            Ok(String::new()),
            Ok(String::new()),
            Ok("hello there".to_string()),
            Ok(String::new()),
        ]);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt, llm(false), tts(false));
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        for _ in 0..4 {
            let _ = orchestrator
                .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
                .await;
        }
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_rolls_back_user_turn() {
        let stt = ScriptedStt::new(vec![Ok("what is the time".to_string())]);
        let tts = tts(false);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt, llm(true), tts.clone());
        let mut events = orchestrator.subscribe();

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        let result = orchestrator
            .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
            .await;

        assert!(matches!(result, Err(Error::Collaborator { .. })));
        assert_eq!(context.history_len(), 0);
        assert!(tts.languages.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        let mut failed_stage = None;
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::TurnFailed { stage, .. } = event {
                failed_stage = Some(stage);
            }
        }
        assert_eq!(failed_stage, Some(TurnStage::Reasoning));
    }

    #[tokio::test]
    async fn test_stt_error_aborts_turn() {
        let stt = ScriptedStt::new(vec![Err(Error::collaborator("stt", "timeout"))]);
        let llm = llm(false);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt, llm.clone(), tts(false));
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        let result = orchestrator
            .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
            .await;
        assert!(result.is_err());
        assert!(llm.seen.lock().unwrap().is_empty());
        // Service errors are not recognition failures
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_empty_synthesis_fails() {
        let stt = ScriptedStt::new(vec![Ok("tell me a story".to_string())]);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt, llm(false), tts(true));
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
        let mut context = ConversationContext::new("system", 10);
        let mut tracker = RecognitionTracker::new(3);

        let result = orchestrator
            .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
            .await;
        assert!(matches!(result, Err(Error::Collaborator { ref service, .. }) if service == "tts"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_is_truncated() {
        let transcripts = (0..6).map(|i| Ok(format!("question number {}", i))).collect();
        let stt = ScriptedStt::new(transcripts);
        let llm = llm(false);
        let orchestrator = TurnOrchestrator::new(OrchestratorConfig::default(), stt, llm.clone(), tts(false));
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(1024);
        let mut context = ConversationContext::new("system", 4);
        let mut tracker = RecognitionTracker::new(3);

        for _ in 0..6 {
            orchestrator
                .process_turn(&segment(), &call(), &mut context, &mut tracker, &tx)
                .await
                .unwrap();
            while rx.try_recv().is_ok() {}
        }

        assert_eq!(context.history_len(), 4);
        assert_eq!(context.turns()[0].role, TurnRole::System);

        // The LLM saw the system prompt first on every call
        let seen = llm.seen.lock().unwrap();
        assert!(seen.iter().all(|turns| turns[0].role == TurnRole::System));
        assert_eq!(seen.last().unwrap().len(), 6);
    }

    #[test]
    fn test_tracker_threshold() {
        let mut tracker = RecognitionTracker::new(2);
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        tracker.record_success();
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
    }
}
