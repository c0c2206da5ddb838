//! Prometheus metrics
//!
//! Call counters and stage latencies, fed from pipeline events.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use phone_agent_pipeline::PipelineEvent;

static PROMETHEUS: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Install the global Prometheus recorder
///
/// Safe to call more than once; only the first call installs. Returns `None`
/// when another recorder already owns the process.
pub fn init_metrics() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Prometheus recorder");
                None
            },
        })
        .clone()
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match PROMETHEUS.get().and_then(Option::as_ref) {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}

pub fn record_call_started() {
    metrics::counter!("phone_agent_calls_total").increment(1);
}

pub fn set_active_calls(count: usize) {
    metrics::gauge!("phone_agent_active_calls").set(count as f64);
}

pub fn record_request(route: &'static str) {
    metrics::counter!("phone_agent_webhook_requests_total", "route" => route).increment(1);
}

pub fn record_outbound_call(success: bool) {
    let outcome = if success { "placed" } else { "failed" };
    metrics::counter!("phone_agent_outbound_calls_total", "outcome" => outcome).increment(1);
}

/// Translate one pipeline event into metric updates
pub fn record_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::SessionStarted { language, .. } => {
            metrics::counter!("phone_agent_sessions_started_total", "language" => language.tag())
                .increment(1);
        },
        PipelineEvent::SegmentReady { truncated, .. } => {
            let outcome = if *truncated { "truncated" } else { "dispatched" };
            metrics::counter!("phone_agent_segments_total", "outcome" => outcome).increment(1);
        },
        PipelineEvent::SegmentTooShort { .. } => {
            metrics::counter!("phone_agent_segments_total", "outcome" => "too_short").increment(1);
        },
        PipelineEvent::SegmentOverflow { .. } => {
            metrics::counter!("phone_agent_segments_total", "outcome" => "overflow").increment(1);
        },
        PipelineEvent::RecognitionFailed { .. } => {
            metrics::counter!("phone_agent_turns_total", "outcome" => "unrecognized").increment(1);
        },
        PipelineEvent::EscalationRequested { .. } => {
            metrics::counter!("phone_agent_escalations_total").increment(1);
        },
        PipelineEvent::TurnCompleted { latency, playback } => {
            metrics::counter!("phone_agent_turns_total", "outcome" => "completed").increment(1);
            metrics::histogram!("phone_agent_stt_latency_ms").record(millis(latency.stt));
            metrics::histogram!("phone_agent_llm_latency_ms").record(millis(latency.llm));
            metrics::histogram!("phone_agent_tts_latency_ms").record(millis(latency.tts));
            metrics::histogram!("phone_agent_turn_latency_ms").record(millis(latency.total));
            metrics::counter!("phone_agent_frames_sent_total").increment(playback.frames_sent as u64);
            if playback.interrupted() {
                metrics::counter!("phone_agent_playback_interrupted_total").increment(1);
            }
        },
        PipelineEvent::TurnFailed { stage, .. } => {
            metrics::counter!("phone_agent_turns_total", "outcome" => "failed").increment(1);
            metrics::counter!("phone_agent_errors_total", "kind" => stage.as_str()).increment(1);
        },
        PipelineEvent::SessionEnded { reason, .. } => {
            metrics::counter!("phone_agent_sessions_ended_total", "reason" => reason.clone())
                .increment(1);
        },
        PipelineEvent::Transcript { .. } | PipelineEvent::Response { .. } => {},
    }
}

fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Record pipeline events until the channel closes
pub fn spawn_event_recorder(mut events: broadcast::Receiver<PipelineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => record_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Metrics recorder lagged behind pipeline events");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use phone_agent_core::Language;
    use phone_agent_pipeline::{PlaybackReport, TurnLatency, TurnStage};
    use std::time::Duration;

    fn render_after(events: &[PipelineEvent]) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            for event in events {
                record_event(event);
            }
        });
        handle.render()
    }

    #[test]
    fn test_turn_metrics() {
        let output = render_after(&[
            PipelineEvent::SessionStarted {
                stream_sid: "MZ1".to_string(),
                language: Language::Hindi,
            },
            PipelineEvent::TurnCompleted {
                latency: TurnLatency {
                    stt: Duration::from_millis(300),
                    llm: Duration::from_millis(500),
                    tts: Duration::from_millis(200),
                    total: Duration::from_millis(1000),
                },
                playback: PlaybackReport {
                    frames_sent: 10,
                    bytes_sent: 1600,
                    bytes_dropped: 0,
                },
            },
            PipelineEvent::TurnFailed {
                stage: TurnStage::Synthesis,
                error: "boom".to_string(),
            },
        ]);

        assert!(output.contains("phone_agent_sessions_started_total{language=\"hi-IN\"} 1"));
        assert!(output.contains("phone_agent_turns_total{outcome=\"completed\"} 1"));
        assert!(output.contains("phone_agent_turns_total{outcome=\"failed\"} 1"));
        assert!(output.contains("phone_agent_errors_total{kind=\"synthesis\"} 1"));
        assert!(output.contains("phone_agent_frames_sent_total 10"));
        assert!(output.contains("phone_agent_turn_latency_ms"));
    }

    #[test]
    fn test_segment_and_escalation_metrics() {
        let output = render_after(&[
            PipelineEvent::SegmentReady { bytes: 8000, truncated: false },
            PipelineEvent::SegmentReady { bytes: 40000, truncated: true },
            PipelineEvent::SegmentTooShort { bytes: 800 },
            PipelineEvent::EscalationRequested { consecutive_failures: 3 },
            PipelineEvent::SessionEnded {
                stream_sid: None,
                reason: "stopped".to_string(),
            },
        ]);

        assert!(output.contains("phone_agent_segments_total{outcome=\"dispatched\"} 1"));
        assert!(output.contains("phone_agent_segments_total{outcome=\"truncated\"} 1"));
        assert!(output.contains("phone_agent_segments_total{outcome=\"too_short\"} 1"));
        assert!(output.contains("phone_agent_escalations_total 1"));
        assert!(output.contains("phone_agent_sessions_ended_total{reason=\"stopped\"} 1"));
    }
}
