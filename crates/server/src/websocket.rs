//! Media stream WebSocket
//!
//! One connection carries one phone call. The socket is split: a reader task
//! parses text frames into `InboundEvent`s for the `CallSession`, and a writer
//! task serializes the session's `OutboundMessage`s back onto the socket.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use phone_agent_pipeline::{CallSession, InboundEvent, OutboundMessage, SessionReport};

use crate::metrics;
use crate::session::CallGuard;
use crate::state::AppState;
use crate::ServerError;

/// Parsed events waiting for the session loop
const INBOUND_BUFFER: usize = 256;
/// Outbound frames waiting for the socket; the pacer keeps this short
const OUTBOUND_BUFFER: usize = 64;
/// Grace period for flushing the writer after the session ends
const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// `GET /media-stream`
pub async fn media_stream_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    let ws = ws.map_err(|rejection| ServerError::WebSocket(rejection.body_text()))?;
    let call_id = state.calls.register()?;
    metrics::record_call_started();
    metrics::set_active_calls(state.calls.count());

    // Released on drop, including when the upgrade never completes
    let guard = CallGuard::new(state.calls.clone(), call_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, guard)))
}

async fn handle_socket(socket: WebSocket, state: AppState, guard: CallGuard) {
    tracing::info!(call_id = %guard.id(), "Media stream connected");
    let (sender, receiver) = socket.split();
    bridge(sender, receiver, &state, guard.id()).await;
}

/// Run one `CallSession` between a WebSocket sink and stream
pub(crate) async fn bridge<Tx, Rx, E>(
    mut ws_sender: Tx,
    mut ws_receiver: Rx,
    state: &AppState,
    call_id: &str,
) -> SessionReport
where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display + Send,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_BUFFER);

    let writer_call_id = call_id.to_string();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(call_id = %writer_call_id, error = %e, "Failed to encode outbound message");
                    continue;
                },
            };
            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                tracing::debug!(call_id = %writer_call_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let registry = state.calls.clone();
    let reader_call_id = call_id.to_string();
    let reader = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match InboundEvent::parse(&text) {
                    Ok(event) => {
                        if let InboundEvent::Start { start } = &event {
                            registry.attach_stream(&reader_call_id, &start.stream_sid, start.call_sid.as_deref());
                        }
                        if inbound_tx.send(event).await.is_err() {
                            break;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(call_id = %reader_call_id, error = %e, "Skipping unparseable frame");
                    },
                },
                Ok(Message::Close(_)) => break,
                // Transport keepalives and stray binary frames carry no events
                Ok(_) => {},
                Err(e) => {
                    tracing::debug!(call_id = %reader_call_id, error = %e, "WebSocket receive failed");
                    break;
                },
            }
        }
    });

    let session = CallSession::new(state.session_config.clone(), state.orchestrator.clone());
    let report = session
        .run(ReceiverStream::new(inbound_rx), Arc::new(outbound_tx))
        .await;

    reader.abort();
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        tracing::warn!(call_id, "Outbound writer did not drain in time");
    }

    tracing::info!(
        call_id,
        stream_sid = report.stream_sid.as_deref().unwrap_or("-"),
        language = report.language.map(|l| l.tag()).unwrap_or("-"),
        ended_by = report.ended_by.as_str(),
        frames = report.stats.frames_received,
        turns = report.stats.turns_completed,
        failed = report.stats.turns_failed,
        escalations = report.stats.escalations,
        "Media stream closed"
    );
    report
}
